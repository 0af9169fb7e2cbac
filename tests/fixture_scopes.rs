//! Fixture scopes and verification checks against mock servers

mod common;

use common::{MockOptions, MockServer};
use futures::FutureExt;
use omnisci_fixture::fixture::{
    check_identity, check_tables_present, run_all, with_session, Check, Environments,
    ModuleFixture, EXPECTED_TABLES,
};
use omnisci_fixture::{CheckFailure, Error};

async fn environments(local: MockOptions, external: MockOptions) -> (MockServer, MockServer, Environments) {
    let local = MockServer::binary(local).await;
    let external = MockServer::http(external).await;
    let envs = Environments {
        local: local.valid_config(),
        external: external.valid_config(),
    };
    (local, external, envs)
}

#[tokio::test]
async fn test_with_session_closes_after_success() {
    let server = MockServer::binary(MockOptions::local()).await;

    let user = with_session(&server.valid_config(), |session| {
        async move { Ok(session.user().to_string()) }.boxed()
    })
    .await
    .unwrap();

    assert_eq!(user, "admin");
    assert_eq!(server.count_calls("disconnect"), 1);
    assert_eq!(server.open_sessions(), 0);
}

#[tokio::test]
async fn test_with_session_closes_after_failure() {
    let server = MockServer::binary(MockOptions::local()).await;

    let result: omnisci_fixture::Result<()> = with_session(&server.valid_config(), |session| {
        async move { check_identity(session, "somebody_else") }.boxed()
    })
    .await;

    assert!(matches!(
        result,
        Err(Error::Check(CheckFailure::UserMismatch { ref actual, .. })) if actual == "admin"
    ));
    assert_eq!(server.count_calls("disconnect"), 1);
    assert_eq!(server.open_sessions(), 0);
}

#[tokio::test]
async fn test_module_fixture_reuses_one_session() {
    let server = MockServer::binary(MockOptions::local()).await;
    let mut fixture = ModuleFixture::new(server.valid_config());
    assert!(!fixture.is_connected());

    assert_eq!(fixture.get().await.unwrap().user(), "admin");
    fixture.get().await.unwrap().list_tables().await.unwrap();
    fixture.get().await.unwrap().list_tables().await.unwrap();
    assert!(fixture.is_connected());
    assert_eq!(server.count_calls("connect"), 1);

    fixture.teardown().await.unwrap();
    assert!(!fixture.is_connected());
    assert_eq!(server.open_sessions(), 0);

    // Teardown twice is a no-op
    fixture.teardown().await.unwrap();
}

#[tokio::test]
async fn test_missing_tables_are_all_listed() {
    let server = MockServer::http(MockOptions::external().tables(&["zipcodes"])).await;

    let err = with_session(&server.valid_config(), |session| {
        check_tables_present(session, &EXPECTED_TABLES).boxed()
    })
    .await
    .unwrap_err();

    match err {
        Error::Check(CheckFailure::MissingTables { database, missing }) => {
            assert_eq!(database, "mapd");
            assert_eq!(missing, ["flights_donotmodify", "tweets_nov_feb"]);
        }
        other => panic!("expected missing tables, got {:?}", other),
    }
}

#[tokio::test]
async fn test_run_all_passes_against_healthy_servers() {
    let (local, external, envs) =
        environments(MockOptions::local(), MockOptions::external()).await;

    let report = run_all(&envs).await;
    assert!(report.passed(), "{:?}", report);
    assert_eq!(report.outcomes.len(), Check::ALL.len());

    // One shared session per configuration, closed after the last check
    for server in [&local, &external] {
        assert_eq!(server.count_calls("connect"), 1);
        assert_eq!(server.count_calls("disconnect"), 1);
        assert_eq!(server.open_sessions(), 0);
    }
}

#[tokio::test]
async fn test_run_all_against_https_external() {
    let local = MockServer::binary(MockOptions::local()).await;
    let external = MockServer::https(MockOptions::external()).await;
    let envs = Environments {
        local: local.valid_config(),
        external: external.valid_config(),
    };

    let report = run_all(&envs).await;
    assert!(report.passed(), "{:?}", report);
    assert_eq!(external.count_calls("connect"), 1);
    assert_eq!(external.open_sessions(), 0);
}

#[tokio::test]
async fn test_run_all_attributes_failures_to_checks() {
    let (_local, external, envs) = environments(
        MockOptions::local(),
        MockOptions::external()
            .reported_user("guest")
            .tables(&["flights_donotmodify"]),
    )
    .await;

    let report = run_all(&envs).await;
    assert!(!report.passed());

    assert!(report.outcome(Check::LocalIdentity).unwrap().passed());
    let identity = report.outcome(Check::ExternalIdentity).unwrap();
    assert_eq!(identity.category, Some("check"));
    assert!(identity.error.as_deref().unwrap().contains("guest"));

    let schema = report.outcome(Check::SchemaPresence).unwrap();
    assert!(schema.error.as_deref().unwrap().contains("tweets_nov_feb"));

    // Both external checks ran on one session, torn down despite the failures
    assert_eq!(external.count_calls("connect"), 1);
    assert_eq!(external.count_calls("disconnect"), 1);
    assert_eq!(external.open_sessions(), 0);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcomes"][2]["check"], "schema_presence");
}

#[tokio::test]
async fn test_run_all_reports_setup_failure_to_each_check() {
    let (local, external, mut envs) =
        environments(MockOptions::local(), MockOptions::external()).await;
    envs.external.password = "wrong".into();

    let report = run_all(&envs).await;

    assert!(report.outcome(Check::LocalIdentity).unwrap().passed());
    for check in [Check::ExternalIdentity, Check::SchemaPresence] {
        assert_eq!(report.outcome(check).unwrap().category, Some("authentication"));
    }

    // The failed connect is not retried for the second external check
    assert_eq!(external.count_calls("connect"), 1);
    assert_eq!(external.count_calls("disconnect"), 0);
    assert_eq!(local.count_calls("disconnect"), 1);
    assert_eq!(local.open_sessions(), 0);
}

#[tokio::test]
async fn test_check_run_stops_at_authentication() {
    let (_local, _external, mut envs) =
        environments(MockOptions::local(), MockOptions::external()).await;
    envs.local.password = "wrong".into();

    let err = Check::LocalIdentity.run(&envs).await.unwrap_err();
    assert_eq!(err.category(), "authentication");
    assert!(Check::ExternalIdentity.run(&envs).await.is_ok());
}
