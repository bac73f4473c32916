mod collections;
mod schema_validation;
mod subscriptions;
mod support;
mod transactions;
