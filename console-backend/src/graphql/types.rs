//! Connection and page info objects.
//!
//! Connections are generated per node type so every list gets its own `XConnection` / `XEdge`
//! pair in the schema.

use async_graphql::{Context, Object};

use crate::{
    clients::{
        hookd::Deployment,
        k8s::{App, Job},
        teams::{Team, TeamMember},
    },
    errors::gql,
    pagination::{Connection, Edge, PageInfo, Pagination},
    resolvers::{
        Services,
        search::SearchResult,
        vulnerabilities::{AppVulnerabilities, TeamVulnerabilities},
    },
    vulnerabilities::TeamSummary,
};

/// Shared services from the schema data.
pub(crate) fn services<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a Services> {
    Ok(ctx.data::<std::sync::Arc<Services>>()?.as_ref())
}

/// Pagination window from the standard connection arguments.
pub(crate) fn pagination(
    first: Option<i32>,
    after: Option<String>,
    last: Option<i32>,
    before: Option<String>,
) -> async_graphql::Result<Pagination> {
    gql(Pagination::from_args(first, last, after.as_deref(), before.as_deref()))
}

#[Object]
impl PageInfo {
    async fn has_next_page(&self) -> bool {
        self.has_next_page
    }

    async fn has_previous_page(&self) -> bool {
        self.has_previous_page
    }

    async fn start_cursor(&self) -> Option<String> {
        self.start_cursor.map(|c| c.encode())
    }

    async fn end_cursor(&self) -> Option<String> {
        self.end_cursor.map(|c| c.encode())
    }

    /// Number of elements in the whole list, not just this page.
    async fn total_count(&self) -> i32 {
        self.total_count as i32
    }
}

macro_rules! connection {
    ($connection:ident, $edge:ident, $node:ty) => {
        pub struct $connection(pub Connection<$node>);

        impl From<Connection<$node>> for $connection {
            fn from(connection: Connection<$node>) -> Self {
                Self(connection)
            }
        }

        #[Object]
        impl $connection {
            async fn edges(&self) -> Vec<$edge> {
                self.0.edges.iter().cloned().map($edge).collect()
            }

            async fn nodes(&self) -> Vec<$node> {
                self.0.nodes().cloned().collect()
            }

            async fn page_info(&self) -> &PageInfo {
                &self.0.page_info
            }
        }

        pub struct $edge(pub Edge<$node>);

        #[Object]
        impl $edge {
            async fn cursor(&self) -> String {
                self.0.cursor.encode()
            }

            async fn node(&self) -> &$node {
                &self.0.node
            }
        }
    };
}

connection!(TeamConnection, TeamEdge, Team);
connection!(TeamMemberConnection, TeamMemberEdge, TeamMember);
connection!(AppConnection, AppEdge, App);
connection!(JobConnection, JobEdge, Job);
connection!(DeploymentConnection, DeploymentEdge, Deployment);
connection!(SearchResultConnection, SearchResultEdge, SearchResult);
connection!(AppVulnerabilitiesConnection, AppVulnerabilitiesEdge, AppVulnerabilities);

#[Object]
impl TeamVulnerabilities {
    /// Sum over every app of the team.
    async fn summary(&self) -> TeamSummary {
        self.summary
    }

    async fn apps(&self) -> AppVulnerabilitiesConnection {
        self.apps.clone().into()
    }
}
