//! Local container deployment tests

mod common;

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use common::{FakeRuntime, FakeTransport};
use vespa_deployer::app::options::DockerOptions;
use vespa_deployer::deploy::docker::{ContainerInfo, PortMapping};
use vespa_deployer::deploy::fsm::ContainerState;
use vespa_deployer::deploy::local::{DockerDeployment, CONFIG_SERVER_PROBE, DUMP_LOG_COMMAND};
use vespa_deployer::errors::DeployError;
use vespa_deployer::output::Output;

const GIB: u64 = 1024 * 1024 * 1024;

fn deployment(runtime: &Arc<FakeRuntime>, http: &Arc<FakeTransport>, output: Output) -> DockerDeployment {
    DockerDeployment::new(runtime.clone(), http.clone(), DockerOptions::default(), output)
}

fn application_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("services.xml"), "<services version=\"1.0\"/>").unwrap();
    dir
}

fn existing_container() -> ContainerInfo {
    ContainerInfo {
        id: "4f1c0ab2e9".to_string(),
        name: "news".to_string(),
        image: "vespaengine/vespa:8.300.1".to_string(),
        memory_bytes: 8 * GIB,
        ports: vec![
            PortMapping { container: 8080, host: 8089 },
            PortMapping { container: 19071, host: 19072 },
        ],
    }
}

#[tokio::test]
async fn test_ensure_running_twice_keeps_one_container() {
    let runtime = Arc::new(FakeRuntime::new());
    let http = Arc::new(FakeTransport::new());
    let mut deployment = deployment(&runtime, &http, Output::capture().0);

    let first = deployment.ensure_running("news", 4 * GIB, false).await.unwrap().clone();
    let identity = deployment.identity();
    let second = deployment.ensure_running("news", 4 * GIB, false).await.unwrap().clone();

    assert_eq!(first, second);
    assert_eq!(identity, deployment.identity());
    assert_eq!(runtime.create_count(), 1);
    assert_eq!(runtime.restart_count(), 1);
    assert_eq!(deployment.state(), ContainerState::AwaitingReadiness);

    let spec = runtime.created.lock().unwrap()[0].clone();
    assert_eq!(spec.hostname, "news");
    assert!(spec.privileged);
    assert_eq!(spec.memory_bytes, 4 * GIB);
    assert_eq!(
        spec.ports,
        vec![
            PortMapping { container: 8080, host: 8080 },
            PortMapping { container: 19071, host: 19071 },
        ]
    );
}

#[tokio::test]
async fn test_ensure_running_restarts_container_found_by_name() {
    let runtime = Arc::new(FakeRuntime::new().with_container(existing_container()));
    let http = Arc::new(FakeTransport::new());
    let mut deployment = deployment(&runtime, &http, Output::capture().0);

    let container = deployment.ensure_running("news", 4 * GIB, true).await.unwrap();

    assert_eq!(container.id, "4f1c0ab2e9");
    assert_eq!(runtime.create_count(), 0);
    assert_eq!(*runtime.restarted.lock().unwrap(), vec!["4f1c0ab2e9".to_string()]);
}

#[tokio::test]
async fn test_debug_port_is_published() {
    let runtime = Arc::new(FakeRuntime::new());
    let http = Arc::new(FakeTransport::new());
    let mut deployment = deployment(&runtime, &http, Output::capture().0);

    deployment.ensure_running("news", 4 * GIB, true).await.unwrap();

    let spec = runtime.created.lock().unwrap()[0].clone();
    assert!(spec.ports.contains(&PortMapping { container: 5005, host: 5005 }));
}

#[tokio::test(start_paused = true)]
async fn test_http_1_0_is_never_ready() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime
        .exec_always(CONFIG_SERVER_PROBE, "HTTP/1.0 200 OK\r\nContent-Length: 0\r\n\r\n")
        .exec_always(DUMP_LOG_COMMAND, "configserver failed to bind 19071");
    let http = Arc::new(FakeTransport::new());
    let (output, captured) = Output::capture();
    let mut deployment = deployment(&runtime, &http, output);
    deployment.ensure_running("news", 4 * GIB, false).await.unwrap();

    let result = deployment.await_config_server_ready(Duration::from_secs(20)).await;

    assert!(matches!(result, Err(DeployError::ReadinessTimeout { waited: 20 })));
    assert_eq!(deployment.state(), ContainerState::Failed);

    let executed = runtime.executed();
    assert_eq!(executed.iter().filter(|c| *c == CONFIG_SERVER_PROBE).count(), 5);
    assert_eq!(executed.last().map(String::as_str), Some(DUMP_LOG_COMMAND));

    let printed = captured.contents();
    assert!(printed.contains("Waiting for configuration server, 0/20 seconds..."));
    assert!(printed.contains("Waiting for configuration server, 15/20 seconds..."));
}

#[tokio::test(start_paused = true)]
async fn test_slow_probes_count_against_budget() {
    let runtime = Arc::new(FakeRuntime::new().with_exec_delay(Duration::from_secs(10)));
    runtime.exec_always(CONFIG_SERVER_PROBE, "HTTP/1.1 503 Service Unavailable\r\n");
    let http = Arc::new(FakeTransport::new());
    let mut deployment = deployment(&runtime, &http, Output::capture().0);
    deployment.ensure_running("news", 4 * GIB, false).await.unwrap();
    let start = tokio::time::Instant::now();

    let result = deployment.await_config_server_ready(Duration::from_secs(20)).await;

    assert!(matches!(result, Err(DeployError::ReadinessTimeout { waited: 20 })));
    // Probes end at 10s and 25s; the second one exceeds the budget
    let executed = runtime.executed();
    assert_eq!(executed.iter().filter(|c| *c == CONFIG_SERVER_PROBE).count(), 2);
    assert!(start.elapsed() < Duration::from_secs(40));
}

#[tokio::test(start_paused = true)]
async fn test_deploy_from_disk() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime
        .exec_once(CONFIG_SERVER_PROBE, "curl: (7) Failed to connect")
        .exec_always(CONFIG_SERVER_PROBE, "HTTP/1.1 200 OK\r\n\r\n");
    let http = Arc::new(FakeTransport::new());
    http.reply(200, r#"{"message":"Session 2 for tenant 'default' prepared and activated."}"#)
        .reply(503, "")
        .reply(200, "{}");
    let (output, captured) = Output::capture();
    let mut deployment = deployment(&runtime, &http, output);
    let dir = application_dir();

    let handle = deployment.deploy_from_disk("news", dir.path(), false).await.unwrap();

    assert_eq!(handle.endpoint(), "http://localhost:8080");
    assert_eq!(deployment.state(), ContainerState::Ready);

    let requests = http.requests();
    assert_eq!(
        requests[0].url,
        "http://localhost:19071/application/v2/tenant/default/prepareandactivate"
    );
    assert_eq!(requests[0].header_value("Content-Type"), Some("application/zip"));
    let archive = zip::ZipArchive::new(Cursor::new(requests[0].body.clone())).unwrap();
    assert_eq!(archive.file_names().collect::<Vec<_>>(), vec!["services.xml"]);
    assert_eq!(requests[1].url, "http://localhost:8080/ApplicationStatus");
    assert_eq!(requests.len(), 3);

    let printed = captured.contents();
    assert!(printed.contains("Waiting for configuration server, 0/300 seconds..."));
    assert!(printed.contains("Waiting for application status, 0/300 seconds..."));
    assert!(printed.trim_end().ends_with("Finished deployment."));
}

#[tokio::test]
async fn test_deploy_failure_carries_remote_message() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.exec_always(CONFIG_SERVER_PROBE, "HTTP/1.1 200 OK\r\n");
    let http = Arc::new(FakeTransport::new());
    http.reply(400, r#"{"error-code":"INVALID_APPLICATION_PACKAGE","message":"Invalid application package"}"#);
    let mut deployment = deployment(&runtime, &http, Output::capture().0);
    let dir = application_dir();

    let err = deployment.deploy_from_disk("news", dir.path(), false).await.unwrap_err();

    assert_eq!(err.remote_message(), Some("Invalid application package"));
    assert!(matches!(err, DeployError::Submission { status: 400, .. }));
}

#[tokio::test]
async fn test_attach_recovers_settings() {
    let runtime = Arc::new(FakeRuntime::new().with_container(existing_container()));
    let http = Arc::new(FakeTransport::new());

    let deployment = DockerDeployment::from_container_name_or_id(
        "4f1c0ab2e9",
        runtime.clone(),
        http.clone(),
        DockerOptions::default(),
        Output::capture().0,
    )
    .await
    .unwrap();

    assert_eq!(deployment.options().port, 8089);
    assert_eq!(deployment.options().cfgsrv_port, 19072);
    assert_eq!(deployment.options().memory_bytes, 8 * GIB);
    let identity = deployment.identity();
    assert_eq!(identity.container_name.as_deref(), Some("news"));
    assert_eq!(identity.image_repository, "vespaengine/vespa");

    let missing = DockerDeployment::from_container_name_or_id(
        "other",
        runtime,
        http,
        DockerOptions::default(),
        Output::capture().0,
    )
    .await;
    assert!(matches!(missing, Err(DeployError::ContainerNotFound(name)) if name == "other"));
}

#[test]
fn test_equality_ignores_image_tag() {
    let runtime = Arc::new(FakeRuntime::new());
    let http = Arc::new(FakeTransport::new());
    let options = |image: &str, port: u16| DockerOptions {
        image: image.to_string(),
        port,
        ..DockerOptions::default()
    };

    let a = DockerDeployment::new(runtime.clone(), http.clone(), options("vespaengine/vespa:8.1", 8080), Output::capture().0);
    let b = DockerDeployment::new(runtime.clone(), http.clone(), options("vespaengine/vespa", 8080), Output::capture().0);
    let c = DockerDeployment::new(runtime, http, options("vespaengine/vespa:8.1", 8089), Output::capture().0);

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(a.to_string().contains("image=vespaengine/vespa)"));
    assert!(c.to_string().contains("port=8089"));
}

#[tokio::test]
async fn test_service_commands_need_a_container() {
    let runtime = Arc::new(FakeRuntime::new());
    let http = Arc::new(FakeTransport::new());
    let mut deployment = deployment(&runtime, &http, Output::capture().0);

    assert!(matches!(deployment.stop_services().await, Err(DeployError::NoContainer)));
    assert!(matches!(deployment.start_services().await, Err(DeployError::NoContainer)));
    assert!(matches!(deployment.restart_services().await, Err(DeployError::NoContainer)));
}

#[tokio::test(start_paused = true)]
async fn test_restart_services() {
    let runtime = Arc::new(FakeRuntime::new().with_container(existing_container()));
    runtime
        .exec_always("/opt/vespa/bin/vespa-stop-services", "Stopping services\nDone")
        .exec_always("/opt/vespa/bin/vespa-stop-configserver", "Stopping config server")
        .exec_always("/opt/vespa/bin/vespa-start-configserver", "Starting config server")
        .exec_always("/opt/vespa/bin/vespa-start-services", "Starting services")
        .exec_always(CONFIG_SERVER_PROBE, "HTTP/1.1 200 OK\r\n");
    let http = Arc::new(FakeTransport::new());
    http.route("/ApplicationStatus", 200, "{}");
    let (output, captured) = Output::capture();
    let mut deployment = DockerDeployment::from_container_name_or_id(
        "news",
        runtime.clone(),
        http.clone(),
        DockerOptions::default(),
        output,
    )
    .await
    .unwrap();

    deployment.restart_services().await.unwrap();

    let commands: Vec<String> = runtime
        .executed()
        .into_iter()
        .filter(|c| c.starts_with("/opt/vespa/bin/"))
        .collect();
    assert_eq!(
        commands,
        vec![
            "/opt/vespa/bin/vespa-stop-services",
            "/opt/vespa/bin/vespa-stop-configserver",
            "/opt/vespa/bin/vespa-start-configserver",
            "/opt/vespa/bin/vespa-start-services",
        ]
    );
    assert_eq!(http.urls(), vec!["http://localhost:8089/ApplicationStatus"]);
    assert_eq!(deployment.state(), ContainerState::Ready);
    assert_eq!(
        captured.contents(),
        "Stopping services\nDone\nStopping config server\nStarting config server\nStarting services\n"
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_services_honours_restart_wait() {
    let runtime = Arc::new(FakeRuntime::new().with_container(existing_container()));
    runtime.exec_always(CONFIG_SERVER_PROBE, "HTTP/1.1 503 Service Unavailable\r\n");
    let http = Arc::new(FakeTransport::new());
    let (output, captured) = Output::capture();
    let options = DockerOptions {
        restart_wait: Duration::from_secs(10),
        ..DockerOptions::default()
    };
    let mut deployment =
        DockerDeployment::from_container_name_or_id("news", runtime.clone(), http.clone(), options, output)
            .await
            .unwrap();
    let start = tokio::time::Instant::now();

    let result = deployment.start_services().await;

    assert!(matches!(result, Err(DeployError::ReadinessTimeout { waited: 10 })));
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert!(start.elapsed() < Duration::from_secs(15));
    assert_eq!(deployment.state(), ContainerState::Failed);

    let executed = runtime.executed();
    assert_eq!(executed.iter().filter(|c| *c == CONFIG_SERVER_PROBE).count(), 3);
    assert!(!executed.iter().any(|c| c == "/opt/vespa/bin/vespa-start-services"));
    assert_eq!(executed.last().map(String::as_str), Some(DUMP_LOG_COMMAND));
    assert!(http.requests().is_empty());
    assert!(captured.contents().contains("Waiting for configuration server, 5/10 seconds..."));
}
