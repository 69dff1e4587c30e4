use futures::future::try_join_all;
use tracing::instrument;

use super::{CLUSTERS, Services, call};
use crate::{
    clients::k8s::{App, Instance, Job},
    errors::{Error, Result},
    pagination::{Connection, Pagination},
};

impl Services {
    /// Applications of `team` across every environment, ordered by name then environment.
    #[instrument(skip(self))]
    pub async fn apps(&self, team: &str, pagination: &Pagination) -> Result<Connection<App>> {
        let mut apps = self.all_apps(Some(team)).await?;
        apps.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.env.cmp(&b.env)));
        Ok(Connection::paginate(apps, pagination))
    }

    /// Naisjobs of `team` across every environment, ordered by name then environment.
    #[instrument(skip(self))]
    pub async fn jobs(&self, team: &str, pagination: &Pagination) -> Result<Connection<Job>> {
        let mut jobs = self.all_jobs(Some(team)).await?;
        jobs.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.env.cmp(&b.env)));
        Ok(Connection::paginate(jobs, pagination))
    }

    #[instrument(skip(self))]
    pub async fn app(&self, env: &str, team: &str, name: &str) -> Result<App> {
        self.check_env(env)?;
        call(CLUSTERS, "apps", self.clusters.apps(env, Some(team)))
            .await?
            .into_iter()
            .find(|app| app.name == name)
            .ok_or_else(|| Error::not_found("app", format!("{env}/{team}/{name}")))
    }

    #[instrument(skip(self))]
    pub async fn job(&self, env: &str, team: &str, name: &str) -> Result<Job> {
        self.check_env(env)?;
        call(CLUSTERS, "jobs", self.clusters.jobs(env, Some(team)))
            .await?
            .into_iter()
            .find(|job| job.name == name)
            .ok_or_else(|| Error::not_found("job", format!("{env}/{team}/{name}")))
    }

    /// Pods of the app or job `name`, ordered by pod name.
    #[instrument(skip(self))]
    pub async fn instances(&self, env: &str, team: &str, name: &str) -> Result<Vec<Instance>> {
        self.check_env(env)?;
        let mut instances = call(CLUSTERS, "instances", self.clusters.instances(env, team, name)).await?;
        instances.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(instances)
    }

    /// Applications in every environment, one concurrent lookup per environment.
    pub(crate) async fn all_apps(&self, team: Option<&str>) -> Result<Vec<App>> {
        let environments = self.clusters.environments();
        let per_env = try_join_all(
            environments
                .iter()
                .map(|env| call(CLUSTERS, "apps", self.clusters.apps(env, team))),
        )
        .await?;
        Ok(per_env.into_iter().flatten().collect())
    }

    pub(crate) async fn all_jobs(&self, team: Option<&str>) -> Result<Vec<Job>> {
        let environments = self.clusters.environments();
        let per_env = try_join_all(
            environments
                .iter()
                .map(|env| call(CLUSTERS, "jobs", self.clusters.jobs(env, team))),
        )
        .await?;
        Ok(per_env.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        errors::Error,
        pagination::Pagination,
        test_utils::{FakeClusters, Fakes, app, instance, job},
    };

    fn clusters() -> FakeClusters {
        FakeClusters::new(&["dev", "prod"])
            .with_app(app("prod", "a", "web", "web:1"))
            .with_app(app("dev", "a", "web", "web:2"))
            .with_app(app("dev", "a", "api", "api:1"))
            .with_app(app("dev", "b", "other", "other:1"))
            .with_job(job("prod", "a", "nightly"))
    }

    #[tokio::test]
    async fn apps_join_all_environments_sorted_by_name_then_env() {
        let services = Fakes::default().with_clusters(clusters()).services();

        let apps = services.apps("a", &Pagination::default()).await.unwrap();
        let ids: Vec<_> = apps.nodes().map(|a| format!("{}/{}", a.name, a.env)).collect();
        assert_eq!(ids, vec!["api/dev", "web/dev", "web/prod"]);
        assert!(!apps.page_info.has_next_page);
    }

    #[tokio::test]
    async fn single_app_lookup() {
        let services = Fakes::default().with_clusters(clusters()).services();

        let web = services.app("prod", "a", "web").await.unwrap();
        assert_eq!(web.image, "web:1");

        assert!(matches!(services.app("prod", "a", "api").await, Err(Error::NotFound { .. })));
        assert!(matches!(services.app("staging", "a", "web").await, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn jobs_and_instances() {
        let clusters = clusters()
            .with_instance(instance("dev", "a", "web", "web-2"))
            .with_instance(instance("dev", "a", "web", "web-1"));
        let services = Fakes::default().with_clusters(clusters).services();

        let jobs = services.jobs("a", &Pagination::default()).await.unwrap();
        assert_eq!(jobs.nodes().count(), 1);

        let instances = services.instances("dev", "a", "web").await.unwrap();
        let names: Vec<_> = instances.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["web-1", "web-2"]);
    }

    #[tokio::test]
    async fn one_failing_cluster_fails_the_list() {
        let clusters = clusters().failing_env("prod");
        let services = Fakes::default().with_clusters(clusters).services();

        let err = services.apps("a", &Pagination::default()).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable { collaborator: "clusters", .. }));
    }
}
