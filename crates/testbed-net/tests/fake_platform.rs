//! Contract tests for the in-memory platform used by the orchestrator tests.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use testbed_net::{
    FakePlatform, LaunchSpec, LinkProfile, NetworkPlatform, PlatformCall, Supervised,
};

#[tokio::test]
async fn test_hosts_get_sequential_addresses() {
    let platform = FakePlatform::new();
    platform.create_switch("s1").await.unwrap();
    let link = LinkProfile::default();

    let a = platform.create_host("h1", "s1", &link).await.unwrap();
    let b = platform.create_host("h2", "s1", &link).await.unwrap();

    assert_eq!(a, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(b, Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(platform.hosts().len(), 2);
}

#[tokio::test]
async fn test_host_on_unknown_switch_fails() {
    let platform = FakePlatform::new();
    let result = platform
        .create_host("h1", "s9", &LinkProfile::default())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_scripted_exit_codes_in_order() {
    let platform = FakePlatform::new();
    platform.script_exits("/bin/collector", [Some(1), Some(0)]);
    let spec = LaunchSpec::new("collector", "/bin/collector");

    let mut first = platform.spawn(None, &spec).await.unwrap();
    let mut second = platform.spawn(None, &spec).await.unwrap();

    assert_eq!(first.wait().await.unwrap(), 1);
    assert_eq!(second.wait().await.unwrap(), 0);
    assert_eq!(platform.spawns_of(&PathBuf::from("/bin/collector")).len(), 2);
}

#[tokio::test]
async fn test_unscripted_process_never_exits_until_terminated() {
    let platform = FakePlatform::new();
    let spec = LaunchSpec::new("h2", "/bin/subscriber");
    let mut process = platform.spawn(Some("h2"), &spec).await.unwrap();

    assert_eq!(platform.running(), vec!["h2".to_string()]);
    let waited = tokio::time::timeout(Duration::from_millis(20), process.wait()).await;
    assert!(waited.is_err(), "unscripted process must not exit");

    process.terminate().await.unwrap();
    assert!(platform.running().is_empty());
    assert_eq!(platform.terminations(), 1);
}

#[tokio::test]
async fn test_touch_on_spawn_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ready");
    let platform = FakePlatform::new();
    platform.touch_on_spawn("/bin/publisher", &marker);

    let _publisher = platform
        .spawn(Some("h1"), &LaunchSpec::new("h1", "/bin/publisher"))
        .await
        .unwrap();

    assert!(marker.exists());
}

#[tokio::test]
async fn test_exec_failure_injection_and_recording() {
    let platform = FakePlatform::new();
    platform.fail_exec("nsd-control", 1);

    let ok = platform
        .exec(Some("h3"), &["nsd".to_string(), "-c".to_string()])
        .await
        .unwrap();
    let failed = platform
        .exec(Some("h3"), &["nsd-control".to_string(), "stop".to_string()])
        .await
        .unwrap();

    assert!(ok.success());
    assert_eq!(failed.exit_code, 1);
    assert_eq!(platform.execs_of("nsd-control").len(), 1);
}

#[tokio::test]
async fn test_destroy_clears_hosts() {
    let platform = FakePlatform::new();
    platform.create_switch("s1").await.unwrap();
    platform
        .create_host("h1", "s1", &LinkProfile::default())
        .await
        .unwrap();

    platform.destroy().await.unwrap();

    assert!(platform.is_destroyed());
    assert!(platform.calls().contains(&PlatformCall::Destroy));
}
