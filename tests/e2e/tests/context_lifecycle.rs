//! User and profile lifecycle against a scripted device.

use hostside_core::testing::FakeDevice;
use hostside_core::{ContextKind, ContextState, HostError, Scenario};
use hostside_e2e::TestHarness;
use hostside_e2e::fixtures::policy_device;
use hostside_e2e::{assert_host_error, assert_passed, assert_skipped};

#[tokio::test]
async fn test_create_then_remove_restores_live_set() {
    let fake = policy_device();
    let mut harness = TestHarness::fake(fake.clone()).expect("failed to create harness");
    let contexts = &mut harness.env.contexts;

    let kept = contexts.create(ContextKind::Secondary).await.unwrap();
    let before = contexts.live_ids();
    assert_eq!(before, vec![kept.id]);

    let mut created = contexts.create(ContextKind::Guest).await.unwrap();
    contexts.remove(&mut created).await.unwrap();

    assert_eq!(contexts.live_ids(), before);
    assert_eq!(created.state(), ContextState::Removed);
    assert!(!fake.user_exists(created.id));

    harness.cleanup().await;
    assert_eq!(fake.user_ids(), vec![0]);
}

#[tokio::test]
async fn test_remove_all_twice_is_quiet() {
    let fake = policy_device();
    let mut harness = TestHarness::fake(fake.clone()).expect("failed to create harness");

    let mut secondary = harness.env.contexts.create(ContextKind::Secondary).await.unwrap();
    harness.env.contexts.start(&mut secondary).await.unwrap();
    harness
        .env
        .contexts
        .create(ContextKind::ManagedProfile { parent: 0 })
        .await
        .unwrap();

    harness.env.contexts.remove_all().await;
    let commands_after_first = fake.commands().len();
    harness.env.contexts.remove_all().await;

    assert!(harness.env.contexts.live().is_empty());
    assert_eq!(fake.user_ids(), vec![0]);
    assert_eq!(fake.commands().len(), commands_after_first);
}

#[tokio::test]
async fn test_remove_all_survives_vanished_user() {
    let fake = policy_device();
    let mut harness = TestHarness::fake(fake.clone()).expect("failed to create harness");

    let first = harness.env.contexts.create(ContextKind::Secondary).await.unwrap();
    harness.env.contexts.create(ContextKind::Secondary).await.unwrap();
    fake.delete_user(first.id);

    harness.env.contexts.remove_all().await;
    assert!(harness.env.contexts.live().is_empty());
    assert_eq!(fake.user_ids(), vec![0]);
}

#[tokio::test]
async fn test_user_limit_is_an_error() {
    let fake = policy_device().with_max_users(2);
    let mut harness = TestHarness::fake(fake).expect("failed to create harness");

    harness.env.contexts.create(ContextKind::Secondary).await.unwrap();
    let result = harness.env.contexts.create(ContextKind::Secondary).await;
    assert_host_error!(result, HostError::RemoteCommand { .. });
    assert_eq!(harness.env.contexts.live().len(), 1);
    harness.cleanup().await;
}

#[tokio::test]
async fn test_no_multi_user_support_skips_without_creating() {
    let fake = FakeDevice::new().with_max_users(1);
    let mut harness = TestHarness::fake(fake.clone()).expect("failed to create harness");

    let report = harness
        .run(
            Scenario::new("secondary-user").require(hostside_core::Capability::MultipleUsers),
            |env| {
                Box::pin(async move {
                    env.contexts.create(ContextKind::Secondary).await?;
                    Ok(())
                })
            },
        )
        .await;

    assert_skipped!(report, "multi-user");
    assert!(
        !fake.commands().iter().any(|c| c.starts_with("pm create-user")),
        "create-user must not be sent: {:?}",
        fake.commands()
    );
}

#[tokio::test]
async fn test_scenario_removes_its_users() {
    let fake = policy_device();
    let mut harness = TestHarness::fake(fake.clone()).expect("failed to create harness");

    let report = harness
        .run(Scenario::new("two-users"), |env| {
            Box::pin(async move {
                let mut guest = env.contexts.create(ContextKind::Guest).await?;
                env.contexts.start(&mut guest).await?;
                env.contexts
                    .create(ContextKind::ManagedProfile { parent: 0 })
                    .await?;
                Ok(())
            })
        })
        .await;

    assert_passed!(report);
    assert_eq!(fake.user_ids(), vec![0]);
    assert!(harness.env.contexts.live().is_empty());
}
