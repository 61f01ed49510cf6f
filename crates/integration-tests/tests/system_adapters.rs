//! System adapter tests against the real OS
//!
//! Only `/bin/sh`, `sleep` and `echo` are required; no emulator needed.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use hijacklab_core::application::{NamespaceResolver, RemoteExecutor};
use hijacklab_core::domain::{ExecMode, ExecutionContext, LabConfig, NodeName};
use hijacklab_core::port::terminal::mocks::MockTerminal;
use hijacklab_core::port::time_provider::SystemTimeProvider;
use hijacklab_infra_system::{SysinfoProcessScanner, TokioCommandRunner};

fn host_config() -> LabConfig {
    LabConfig {
        attach_command: Vec::new(),
        shell: vec!["/bin/sh".to_string(), "-c".to_string()],
        ..LabConfig::default()
    }
}

fn executor(config: &LabConfig) -> RemoteExecutor {
    RemoteExecutor::new(
        Arc::new(TokioCommandRunner::new(Arc::new(SystemTimeProvider))),
        Arc::new(MockTerminal::new()),
        config,
    )
}

#[tokio::test]
async fn test_echo_through_shell() {
    let config = host_config();
    let context = ExecutionContext {
        node: NodeName::new("local").unwrap(),
        pid: std::process::id(),
    };

    let result = executor(&config)
        .execute(&context, "echo X | tr X Y; echo done >&2", ExecMode::Capture)
        .await;

    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout, "Y");
    assert_eq!(result.stderr, "done");
}

#[tokio::test]
async fn test_timeout_yields_empty_output() {
    let config = host_config();
    let executor = executor(&config).with_timeout(Duration::from_millis(200));

    let started = std::time::Instant::now();
    let result = executor
        .execute_host("echo early; sleep 10", ExecMode::Capture)
        .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(result.is_blank());
    assert_eq!(result.exit_code, None);
}

#[tokio::test]
async fn test_tagged_process_is_resolved() {
    // `$0` carries the node tag, like the emulator's node shells
    let mut child = tokio::process::Command::new("/bin/sh")
        .args(["-c", "sleep 30; true", "mininet:itest-1"])
        .stdout(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let child_pid = child.id().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let resolver =
        NamespaceResolver::new(Arc::new(SysinfoProcessScanner::new()), &LabConfig::default())
            .unwrap();
    let context = resolver.resolve(&NodeName::new("itest-1").unwrap()).unwrap();

    assert_eq!(context.pid, child_pid);
    assert!(resolver.list().contains_key(&context.node));
    assert!(resolver.resolve(&NodeName::new("itest-2").unwrap()).is_err());

    child.kill().await.unwrap();
}
