//! Control plane paths

/// Local config server deployment endpoint
pub const PREPARE_AND_ACTIVATE_PATH: &str = "/application/v2/tenant/default/prepareandactivate";

/// Health endpoint served by both the config server and the application container
pub const APPLICATION_STATUS_PATH: &str = "/ApplicationStatus";

/// Default zone of the dev environment
pub const DEV_ZONE_PATH: &str = "/zone/v1/environment/dev/default";

/// `/application/v4/tenant/{t}/application/{a}/instance/{i}`
pub fn instance_path(tenant: &str, application: &str, instance: &str) -> String {
    format!(
        "/application/v4/tenant/{}/application/{}/instance/{}",
        tenant, application, instance
    )
}

/// Deployment of an instance in a dev region
pub fn dev_deployment_path(tenant: &str, application: &str, instance: &str, region: &str) -> String {
    format!(
        "{}/environment/dev/region/{}",
        instance_path(tenant, application, instance),
        region
    )
}

/// Submission endpoint for a job
pub fn deploy_path(tenant: &str, application: &str, instance: &str, job: &str) -> String {
    format!("{}/deploy/{}", instance_path(tenant, application, instance), job)
}

/// Incremental run status after log entry `after`
pub fn run_path(tenant: &str, application: &str, instance: &str, job: &str, run: u64, after: i64) -> String {
    format!(
        "{}/job/{}/run/{}?after={}",
        instance_path(tenant, application, instance),
        job,
        run,
        after
    )
}
