mod coordinator;
mod query;
mod store;
