//! API endpoint URL builders

/// OAuth token endpoint on the auth service
pub fn token_url(auth_url: &str) -> String {
    format!("{}/oauth/token", auth_url)
}

/// Job creation. The trailing slash is part of the route.
pub fn create_job_url(ingestion_url: &str) -> String {
    format!("{}/job/", ingestion_url)
}

pub fn signing_url(ingestion_url: &str, job_id: &str) -> String {
    format!("{}/job/{}/signing-url", ingestion_url, job_id)
}

pub fn done_url(ingestion_url: &str, job_id: &str) -> String {
    format!("{}/job/{}/done", ingestion_url, job_id)
}

/// `fail_type` is either `failed` or `cancel`
pub fn failure_url(ingestion_url: &str, job_id: &str, fail_type: &str) -> String {
    format!("{}/job/{}/{}", ingestion_url, job_id, fail_type)
}

pub fn ingestion_config_url(app_url: &str, app_id: &str, config_id: &str) -> String {
    format!("{}/app/{}/ingestionConfig/{}", app_url, app_id, config_id)
}

pub fn status_url(app_url: &str, app_id: &str) -> String {
    format!("{}/app/v1/{}/status", app_url, app_id)
}
