//! Package provisioning against a scripted device.

use hostside_core::{Artifact, ContextKind, HostError, Scenario};
use hostside_e2e::fixtures::{ADMIN_PKG, TEST_APP_PKG, policy_device};
use hostside_e2e::scenarios::package_isolated_to_user;
use hostside_e2e::{TestHarness, assert_failed, assert_host_error, assert_passed};

#[tokio::test]
async fn test_install_into_single_user() {
    let fake = policy_device();
    let mut harness = TestHarness::fake(fake.clone()).expect("failed to create harness");
    let app = harness.fixtures.test_app();

    let report = harness
        .run(Scenario::new("isolation"), move |env| {
            Box::pin(package_isolated_to_user(env, app))
        })
        .await;

    assert_passed!(report);
    assert!(!fake.is_installed(0, TEST_APP_PKG));
    assert_eq!(fake.user_ids(), vec![0]);
}

#[tokio::test]
async fn test_missing_artifact_fails_and_cleanup_still_succeeds() {
    let fake = policy_device();
    let mut harness = TestHarness::fake(fake.clone()).expect("failed to create harness");
    let primary = harness.env.contexts.primary().await.unwrap();

    let admin = harness.fixtures.admin();
    harness.env.packages.install(&admin, &primary).await.unwrap();

    let missing = Artifact::new(ADMIN_PKG, harness.fixtures.artifact_dir().join("Gone.apk"));
    let result = harness.env.packages.install(&missing, &primary).await;
    assert_host_error!(result, HostError::Install { .. });

    harness.env.packages.uninstall_all().await;
    harness.env.packages.uninstall_all().await;
    assert!(harness.env.packages.installed().is_empty());
    assert!(!fake.is_installed(0, ADMIN_PKG));
}

#[tokio::test]
async fn test_missing_artifact_scenario_fails_with_install_error() {
    let fake = policy_device();
    let mut harness = TestHarness::fake(fake.clone()).expect("failed to create harness");
    let missing = Artifact::new(ADMIN_PKG, harness.fixtures.artifact_dir().join("Gone.apk"));

    let report = harness
        .run(Scenario::new("missing-artifact"), move |env| {
            Box::pin(async move {
                let mut user = env.contexts.create(ContextKind::Secondary).await?;
                env.contexts.start(&mut user).await?;
                env.packages.install(&missing, &user).await?;
                Ok(())
            })
        })
        .await;

    assert_failed!(report, "artifact not found");
    assert_eq!(fake.user_ids(), vec![0]);
}

#[tokio::test]
async fn test_rejected_package_is_still_uninstalled() {
    let fake = policy_device();
    let mut harness = TestHarness::fake(fake.clone()).expect("failed to create harness");
    let primary = harness.env.contexts.primary().await.unwrap();

    // The fake has no package mapping for this file, so pm rejects it.
    let unknown = harness.fixtures.artifact_dir().join("Unknown.apk");
    std::fs::write(&unknown, b"PK").unwrap();
    let result = harness
        .env
        .packages
        .install(&Artifact::new("com.example.unknown", unknown), &primary)
        .await;

    assert_host_error!(result, HostError::Install { .. });
    assert_eq!(harness.env.packages.installed().len(), 1);
    harness.env.packages.uninstall_all().await;
    assert!(harness.env.packages.installed().is_empty());
}

#[tokio::test]
async fn test_install_into_removed_user_is_refused() {
    let fake = policy_device();
    let mut harness = TestHarness::fake(fake.clone()).expect("failed to create harness");
    let mut user = harness.env.contexts.create(ContextKind::Secondary).await.unwrap();
    harness.env.contexts.remove(&mut user).await.unwrap();

    let admin = harness.fixtures.admin();
    let result = harness.env.packages.install(&admin, &user).await;
    assert_host_error!(result, HostError::Install { .. });
    assert!(
        !fake.commands().iter().any(|c| c.starts_with("pm install")),
        "{:?}",
        fake.commands()
    );
}
