//! Global node lookup by [`Ident`].

use std::collections::HashMap;

use async_graphql::Union;
use async_trait::async_trait;

use super::Services;
use crate::{
    clients::{
        hookd::Deployment,
        k8s::{App, Job},
        teams::{Team, User},
    },
    errors::{Error, Result},
    types::{Ident, IdentKind},
};

#[derive(Debug, Clone, PartialEq, Union)]
pub enum Node {
    Team(Team),
    User(User),
    App(App),
    Job(Job),
    Deployment(Deployment),
}

/// Loads the node an identifier of one kind points at.
#[async_trait]
pub trait NodeResolver: Send + Sync {
    async fn resolve(&self, services: &Services, ident: &Ident) -> Result<Node>;
}

struct TeamResolver;
struct UserResolver;
struct AppResolver;
struct JobResolver;
struct DeploymentResolver;

#[async_trait]
impl NodeResolver for TeamResolver {
    async fn resolve(&self, services: &Services, ident: &Ident) -> Result<Node> {
        services.team(ident.part(0)).await.map(Node::Team)
    }
}

#[async_trait]
impl NodeResolver for UserResolver {
    async fn resolve(&self, services: &Services, ident: &Ident) -> Result<Node> {
        services.user(ident.part(0)).await.map(Node::User)
    }
}

#[async_trait]
impl NodeResolver for AppResolver {
    async fn resolve(&self, services: &Services, ident: &Ident) -> Result<Node> {
        services
            .app(ident.part(0), ident.part(1), ident.part(2))
            .await
            .map(Node::App)
    }
}

#[async_trait]
impl NodeResolver for JobResolver {
    async fn resolve(&self, services: &Services, ident: &Ident) -> Result<Node> {
        services
            .job(ident.part(0), ident.part(1), ident.part(2))
            .await
            .map(Node::Job)
    }
}

#[async_trait]
impl NodeResolver for DeploymentResolver {
    async fn resolve(&self, services: &Services, ident: &Ident) -> Result<Node> {
        services
            .deployment(ident.part(0), ident.part(1))
            .await
            .map(Node::Deployment)
    }
}

/// Dispatch table from identifier kind to resolver.
pub struct NodeResolvers(HashMap<IdentKind, Box<dyn NodeResolver>>);

impl NodeResolvers {
    pub fn get(&self, kind: IdentKind) -> Option<&dyn NodeResolver> {
        self.0.get(&kind).map(Box::as_ref)
    }
}

impl Default for NodeResolvers {
    fn default() -> Self {
        let mut resolvers: HashMap<IdentKind, Box<dyn NodeResolver>> = HashMap::new();
        resolvers.insert(IdentKind::Team, Box::new(TeamResolver));
        resolvers.insert(IdentKind::User, Box::new(UserResolver));
        resolvers.insert(IdentKind::App, Box::new(AppResolver));
        resolvers.insert(IdentKind::Job, Box::new(JobResolver));
        resolvers.insert(IdentKind::Deployment, Box::new(DeploymentResolver));
        Self(resolvers)
    }
}

impl Services {
    /// Resolve an opaque node id.
    pub async fn node(&self, id: &str) -> Result<Node> {
        let ident = Ident::parse(id)?;
        let resolver = self
            .nodes
            .get(ident.kind)
            .ok_or_else(|| Error::invalid_argument(format!("nodes of kind {} cannot be looked up", ident.kind)))?;
        resolver.resolve(self, &ident).await
    }
}
