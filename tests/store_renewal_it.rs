mod common;

// std
use std::{collections::BTreeMap, sync::Arc, time::Duration};
// crates.io
use tokio::time::Instant;
// self
use common::{FakeAuthority, Reply, TestStore};
use remoting_token::{
	CancellationToken,
	flows::RenewalStatus,
	provider::{
		DefaultProviderStrategy, GrantType, ProviderErrorContext, ProviderErrorKind,
		ProviderStrategy,
	},
};

const SECOND: Duration = Duration::from_secs(1);

fn cached_access(store: &TestStore) -> String {
	store
		.cached_token()
		.map(|token| token.access_token.expose().to_owned())
		.expect("A token should be cached.")
}

/// Adds an `audience` form field to every grant.
struct AudienceStrategy;
impl ProviderStrategy for AudienceStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		DefaultProviderStrategy.classify_token_error(ctx)
	}

	fn augment_token_request(&self, grant: GrantType, form: &mut BTreeMap<String, String>) {
		form.insert("audience".into(), "remoting-api".into());
		form.insert("grant_hint".into(), grant.as_str().into());
	}
}

async fn logged_in(authority: &FakeAuthority, shutdown: CancellationToken) -> TestStore {
	let store = common::store(authority, shutdown);

	store.get_token(&CancellationToken::new()).await.expect("Cold start should log in.");

	store
}

#[tokio::test(start_paused = true)]
async fn renewal_follows_each_token_lifetime() {
	let authority = FakeAuthority::default();

	authority.queue_refresh(Reply::token("refreshed-short", Some("rotated"), 1_800));

	let store = logged_in(&authority, CancellationToken::new()).await;
	let started = Instant::now();
	let mut status = store.renewal_status();
	let first = common::wait_for_status(&mut status, |s| matches!(s, RenewalStatus::Scheduled { .. }))
		.await;

	assert_eq!(
		first,
		RenewalStatus::Scheduled { wake_in: Duration::from_secs(3_540), retry_count: 0 }
	);

	let second = common::wait_for_status(&mut status, |s| {
		matches!(s, RenewalStatus::Scheduled { wake_in, .. } if *wake_in == Duration::from_secs(1_740))
	})
	.await;
	let elapsed = started.elapsed();

	assert_eq!(second, RenewalStatus::Scheduled { wake_in: Duration::from_secs(1_740), retry_count: 0 });
	assert!(elapsed >= Duration::from_secs(3_540) && elapsed < Duration::from_secs(3_541));
	assert_eq!(cached_access(&store), "refreshed-short");
	assert_eq!(authority.refresh_calls(), 1);
	assert_eq!(authority.login_calls(), 1);
	assert_eq!(store.metrics().attempts(), 1);
	assert_eq!(store.metrics().successes(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_recovers_through_a_backoff_login() {
	let authority = FakeAuthority::default();

	authority.queue_refresh(Reply::OAuthError { status: 400, error: "invalid_grant" });

	let store = logged_in(&authority, CancellationToken::new()).await;
	let started = Instant::now();
	let mut status = store.renewal_status();
	let recovering =
		common::wait_for_status(&mut status, |s| matches!(s, RenewalStatus::Recovering { .. }))
			.await;
	let RenewalStatus::Recovering { retry_count, delay } = recovering else {
		unreachable!("The predicate only accepts recovering states.");
	};

	assert_eq!(retry_count, 1);
	assert!(
		delay >= Duration::from_secs(180) && delay < Duration::from_secs(270),
		"Unexpected first backoff delay {delay:?}."
	);
	assert!(started.elapsed() >= Duration::from_secs(3_545));
	assert!(started.elapsed() < Duration::from_secs(3_546));
	assert_eq!(authority.login_calls(), 1);

	let scheduled =
		common::wait_for_status(&mut status, |s| matches!(s, RenewalStatus::Scheduled { .. }))
			.await;
	let elapsed = started.elapsed();
	let expected = Duration::from_secs(3_545) + delay;

	assert_eq!(
		scheduled,
		RenewalStatus::Scheduled { wake_in: Duration::from_secs(3_540), retry_count: 0 }
	);
	assert!(elapsed >= expected && elapsed < expected + SECOND, "Recovered after {elapsed:?}.");
	assert_eq!(cached_access(&store), "login-2");
	assert_eq!(authority.login_calls(), 2);
	assert_eq!(authority.refresh_calls(), 1);
	assert_eq!(store.metrics().attempts(), 1);
	assert_eq!(store.metrics().failures(), 1);
	assert_eq!(store.metrics().fallback_logins(), 1);

	tokio::time::sleep(Duration::from_secs(3_000)).await;

	assert_eq!(authority.login_calls(), 2);
	assert_eq!(authority.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_login_failures_grow_the_retry_count() {
	let authority = FakeAuthority::default();

	authority
		.queue_login(Reply::token("login-1", Some("login-refresh-1"), 3_600))
		.queue_login(Reply::Status(503))
		.queue_login(Reply::OAuthError { status: 401, error: "invalid_client" })
		.queue_refresh(Reply::Unreachable);

	let store = logged_in(&authority, CancellationToken::new()).await;
	let mut status = store.renewal_status();

	for expected in 1..=3 {
		let recovering = common::wait_for_status(&mut status, |s| {
			matches!(s, RenewalStatus::Recovering { retry_count, .. } if *retry_count == expected)
		})
		.await;

		assert!(
			matches!(recovering, RenewalStatus::Recovering { delay, .. } if delay >= Duration::from_secs(180)),
			"Backoff delays should respect the floor: {recovering:?}."
		);
	}

	let scheduled =
		common::wait_for_status(&mut status, |s| matches!(s, RenewalStatus::Scheduled { .. }))
			.await;

	assert_eq!(
		scheduled,
		RenewalStatus::Scheduled { wake_in: Duration::from_secs(3_540), retry_count: 0 }
	);
	assert_eq!(cached_access(&store), "login-4");
	assert_eq!(authority.login_calls(), 4);
	assert_eq!(store.metrics().fallback_logins(), 3);
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_the_scheduled_sleep() {
	let authority = FakeAuthority::default();
	let shutdown = CancellationToken::new();
	let store = logged_in(&authority, shutdown.clone()).await;
	let mut status = store.renewal_status();

	common::wait_for_status(&mut status, |s| matches!(s, RenewalStatus::Scheduled { .. })).await;

	let started = Instant::now();

	shutdown.cancel();
	common::wait_for_status(&mut status, |s| *s == RenewalStatus::Stopped).await;

	assert!(started.elapsed() < Duration::from_millis(1));

	tokio::time::sleep(Duration::from_secs(7_200)).await;

	assert_eq!(authority.total_calls(), 2);
	assert_eq!(
		store.get_token(&CancellationToken::new()).await.map(|t| t.expose().to_owned()).ok(),
		Some("login-1".into()),
		"The cached token stays readable after shutdown."
	);
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_the_backoff_wait() {
	let authority = FakeAuthority::default();

	authority.queue_refresh(Reply::Status(502));

	let shutdown = CancellationToken::new();
	let store = logged_in(&authority, shutdown.clone()).await;
	let mut status = store.renewal_status();

	common::wait_for_status(&mut status, |s| matches!(s, RenewalStatus::Recovering { .. })).await;
	shutdown.cancel();
	common::wait_for_status(&mut status, |s| *s == RenewalStatus::Stopped).await;
	tokio::time::sleep(Duration::from_secs(600)).await;

	assert_eq!(authority.login_calls(), 1);
	assert_eq!(authority.refresh_calls(), 1);
	assert_eq!(store.metrics().fallback_logins(), 0);
}

#[tokio::test(start_paused = true)]
async fn token_without_refresh_token_is_renewed_by_a_new_grant() {
	let authority = FakeAuthority::default();

	authority.queue_login(Reply::token("login-1", None, 3_600));

	let store = logged_in(&authority, CancellationToken::new()).await;

	tokio::time::sleep(Duration::from_secs(3_541)).await;

	assert_eq!(authority.refresh_calls(), 0);
	assert_eq!(authority.login_calls(), 2);
	assert_eq!(authority.discovery_calls(), 1);
	assert_eq!(common::form_value(&authority, 1, "grant_type").as_deref(), Some("client_credentials"));
	assert_eq!(cached_access(&store), "login-2");
	assert_eq!(store.metrics().successes(), 1);
	assert_eq!(store.metrics().fallback_logins(), 0);
}

#[tokio::test(start_paused = true)]
async fn refresh_token_is_kept_until_the_authority_rotates_it() {
	let authority = FakeAuthority::default();

	authority.queue_refresh(Reply::token("refreshed-1", None, 3_600));

	let _store = logged_in(&authority, CancellationToken::new()).await;

	tokio::time::sleep(Duration::from_secs(3_541)).await;
	tokio::time::sleep(Duration::from_secs(3_540)).await;
	tokio::time::sleep(Duration::from_secs(3_540)).await;

	assert_eq!(authority.refresh_calls(), 3);
	assert_eq!(common::form_value(&authority, 1, "grant_type").as_deref(), Some("refresh_token"));
	assert_eq!(
		common::form_value(&authority, 1, "refresh_token").as_deref(),
		Some("login-refresh-1")
	);
	assert_eq!(
		common::form_value(&authority, 2, "refresh_token").as_deref(),
		Some("login-refresh-1")
	);
	assert_eq!(
		common::form_value(&authority, 3, "refresh_token").as_deref(),
		Some("refresh-after-2")
	);
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_an_active_loop() {
	let authority = FakeAuthority::default();

	authority.queue_refresh(Reply::OAuthError { status: 400, error: "invalid_grant" });

	let store = logged_in(&authority, CancellationToken::new()).await;
	let mut status = store.renewal_status();

	common::wait_for_status(&mut status, |s| matches!(s, RenewalStatus::Recovering { .. })).await;
	store.stop().await;

	assert_eq!(*status.borrow(), RenewalStatus::Stopped);
	assert!(store.cached_token().is_none());

	tokio::time::sleep(Duration::from_secs(600)).await;

	assert_eq!(authority.login_calls(), 1);
	assert_eq!(*store.renewal_status().borrow(), RenewalStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn strategy_parameters_reach_login_and_refresh() {
	let authority = FakeAuthority::default();
	let store = common::store_with(
		&authority,
		common::config(),
		Arc::new(AudienceStrategy),
		CancellationToken::new(),
	);

	store.get_token(&CancellationToken::new()).await.expect("Cold start should log in.");
	tokio::time::sleep(Duration::from_secs(3_541)).await;

	assert_eq!(authority.login_calls(), 1);
	assert_eq!(authority.refresh_calls(), 1);

	for (index, grant) in [(0, "client_credentials"), (1, "refresh_token")] {
		assert_eq!(common::form_value(&authority, index, "grant_type").as_deref(), Some(grant));
		assert_eq!(
			common::form_value(&authority, index, "audience").as_deref(),
			Some("remoting-api")
		);
		assert_eq!(common::form_value(&authority, index, "grant_hint").as_deref(), Some(grant));
	}

	assert_eq!(cached_access(&store), "refreshed-1");
}
