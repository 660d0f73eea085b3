//! Email-link sign-in for the authenticated path.
//!
//! Sign-in sends the account an email containing a confirmation link; only a
//! human can read that inbox. The link is therefore obtained through the
//! injectable [`LinkSource`] seam rather than console I/O baked into the
//! crate — an application wires in whatever prompt fits it.

use super::{SessionNegotiator, absorb_cookies};

use crate::error::handshake::HandshakeError;

use common::{CookieSet, ErrorLocation};

use std::panic::Location;

use log::info;
use url::Url;

const SIGNIN_PATH: &str = "api/auth/signin-email";
const EMAIL_FORM_FIELD: &str = "email";

/// Source of the emailed confirmation link.
pub trait LinkSource {
    /// Return the confirmation link received for `account`.
    fn confirmation_link(&self, account: &str) -> Result<String, HandshakeError>;
}

impl<F> LinkSource for F
where
    F: Fn(&str) -> Result<String, HandshakeError>,
{
    fn confirmation_link(&self, account: &str) -> Result<String, HandshakeError> {
        self(account)
    }
}

impl SessionNegotiator {
    /// Sign the account in: request the email, follow the supplied
    /// confirmation link, and accumulate the resulting cookies.
    pub async fn login(
        &self,
        account: &str,
        link_source: &dyn LinkSource,
        cookies: &mut CookieSet,
    ) -> Result<(), HandshakeError> {
        let url = self.base.join(SIGNIN_PATH)?;

        let response = self
            .with_cookies(self.http.post(url), cookies)
            .form(&[(EMAIL_FORM_FIELD, account)])
            .send()
            .await?;
        absorb_cookies(cookies, &response);

        let link = link_source.confirmation_link(account)?;
        let link = Url::parse(&link).map_err(|e| HandshakeError::Login {
            message: format!("confirmation link is not a valid url: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let response = self.with_cookies(self.http.get(link), cookies).send().await?;
        absorb_cookies(cookies, &response);

        info!("login complete, {} cookies held", cookies.len());
        Ok(())
    }
}
