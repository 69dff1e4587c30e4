use async_graphql::{Context, ErrorExtensions, Result, Subscription};
use futures::{Stream, StreamExt};

use super::types::services;
use crate::{
    clients::k8s::LogLine,
    errors::{Error, gql},
};

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Follow the logs of every instance of an app or a job. Exactly one of `app` and `job` must
    /// be given. `container` defaults to the workload name.
    async fn log(
        &self,
        ctx: &Context<'_>,
        env: String,
        team: String,
        app: Option<String>,
        job: Option<String>,
        container: Option<String>,
    ) -> Result<impl Stream<Item = Result<LogLine>>> {
        let name = match (app, job) {
            (Some(name), None) | (None, Some(name)) => name,
            _ => return Err(Error::invalid_argument("exactly one of app and job must be given").extend()),
        };
        let lines = gql(services(ctx)?.logs(&env, &team, &name, container.as_deref()).await)?;
        Ok(lines.map(gql))
    }
}
