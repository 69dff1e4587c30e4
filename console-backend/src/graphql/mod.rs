//! The GraphQL surface: schema, node objects and the axum routes serving them.
//!
//! Resolvers are thin; each one forwards to a [`Services`] operation and converts its error with
//! [`crate::errors::gql`].

mod objects;
pub mod query;
pub mod routes;
pub mod subscription;
pub mod types;

use std::sync::Arc;

use async_graphql::{EmptyMutation, Schema};

use crate::resolvers::Services;
pub use query::QueryRoot;
pub use subscription::SubscriptionRoot;

pub type ConsoleSchema = Schema<QueryRoot, EmptyMutation, SubscriptionRoot>;

pub fn build_schema(services: Arc<Services>) -> ConsoleSchema {
    Schema::build(QueryRoot, EmptyMutation, SubscriptionRoot)
        .data(services)
        .finish()
}
