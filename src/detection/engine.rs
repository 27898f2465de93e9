//! Login authorization engine
//!
//! Combines the whitelist check with the origin fence. Every decision
//! starts from the files on disk, so edits made by hand take effect on the
//! next login without a restart.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use super::drift::{DriftPolicy, ExactMatch, SubnetMatch};
use crate::config::{Config, ConfigError, FenceMode, GeoProvider, LookupFailurePolicy, MessagesConfig};
use crate::geolocation::{GeoError, GeoResolver, HttpGeoResolver, MaxMindResolver};
use crate::models::{normalize_username, DenyReason, LoginAttempt, LoginVerdict};
use crate::persistence::{OriginTracker, WhitelistStore};

/// Errors returned by administrative operations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AdminError {
    #[error("Invalid username: {0:?}")]
    InvalidUsername(String),
}

/// Where the descriptor for a login comes from
pub enum OriginSource {
    /// The raw peer address string
    PeerAddress,
    /// The peer address resolved to a place name
    Geolocated(Box<dyn GeoResolver>),
}

/// Descriptor source plus the policy that judges drift between descriptors
pub struct Fence {
    source: OriginSource,
    policy: Box<dyn DriftPolicy>,
}

impl Fence {
    pub fn new(source: OriginSource, policy: Box<dyn DriftPolicy>) -> Self {
        Fence { source, policy }
    }

    /// Raw IPs, same /24 required
    pub fn subnet() -> Self {
        Self::new(OriginSource::PeerAddress, Box::new(SubnetMatch))
    }

    /// Geolocated place names, exact match required
    pub fn city(resolver: Box<dyn GeoResolver>) -> Self {
        Self::new(OriginSource::Geolocated(resolver), Box::new(ExactMatch))
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    fn needs_lookup(&self) -> bool {
        matches!(self.source, OriginSource::Geolocated(_))
    }

    fn describe(&self, origin: &str) -> Result<String, GeoError> {
        match &self.source {
            OriginSource::PeerAddress => Ok(origin.to_string()),
            OriginSource::Geolocated(resolver) => {
                let ip = IpAddr::from_str(origin)
                    .map_err(|_| GeoError::InvalidAddress(origin.to_string()))?;
                resolver.resolve(&ip)
            }
        }
    }
}

struct GateState {
    whitelist: WhitelistStore,
    origins: OriginTracker,
}

impl GateState {
    fn reload(&mut self) {
        self.whitelist.reload();
        self.origins.reload();
    }
}

/// Decides logins and applies operator mutations
///
/// One lock guards both stores; a login holds it from reload through
/// persisting the new baseline. Geolocation lookups happen with the lock
/// released, after which membership is checked again.
pub struct AuthorizationEngine {
    state: Mutex<GateState>,
    fence: Option<Fence>,
    messages: MessagesConfig,
    on_lookup_failure: LookupFailurePolicy,
}

impl AuthorizationEngine {
    /// Whitelist-only engine over the given stores
    pub fn new(whitelist: WhitelistStore, origins: OriginTracker) -> Self {
        AuthorizationEngine {
            state: Mutex::new(GateState { whitelist, origins }),
            fence: None,
            messages: MessagesConfig::default(),
            on_lookup_failure: LookupFailurePolicy::Deny,
        }
    }

    pub fn with_fence(mut self, fence: Fence) -> Self {
        self.fence = Some(fence);
        self
    }

    pub fn with_messages(mut self, messages: MessagesConfig) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_lookup_failure_policy(mut self, policy: LookupFailurePolicy) -> Self {
        self.on_lookup_failure = policy;
        self
    }

    /// Build the engine described by a configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let whitelist = WhitelistStore::open(config.storage.whitelist_path());
        let origins = OriginTracker::open(config.storage.origins_path());
        let mut engine = AuthorizationEngine::new(whitelist, origins)
            .with_messages(config.messages.clone())
            .with_lookup_failure_policy(config.fence.on_lookup_failure);

        let geo = &config.geolocation;
        engine.fence = match config.fence.mode {
            FenceMode::Disabled => None,
            FenceMode::Subnet => Some(Fence::subnet()),
            FenceMode::City => {
                let resolver: Box<dyn GeoResolver> = match geo.provider {
                    GeoProvider::Http => Box::new(HttpGeoResolver::new(
                        &geo.endpoint,
                        &geo.place_field,
                        Duration::from_secs(geo.timeout_seconds),
                    )?),
                    GeoProvider::Maxmind => {
                        let path = geo.database_path.as_ref().ok_or_else(|| {
                            ConfigError::Invalid("geolocation.database_path is not set".to_string())
                        })?;
                        Box::new(MaxMindResolver::new(path)?.with_language(&geo.language))
                    }
                };
                Some(Fence::city(resolver))
            }
        };

        log::info!(
            "Login gate ready: fence={:?}, lookup failures {:?}",
            config.fence.mode,
            config.fence.on_lookup_failure
        );
        Ok(engine)
    }

    pub fn fence(&self) -> Option<&Fence> {
        self.fence.as_ref()
    }

    /// Decide one login attempt
    pub fn evaluate_login(&self, attempt: &LoginAttempt) -> LoginVerdict {
        let username = normalize_username(&attempt.username);
        let username = username.as_str();

        let mut state = self.lock();
        state.reload();
        if !state.whitelist.contains(username) {
            return self.not_whitelisted(attempt);
        }

        let fence = match &self.fence {
            Some(fence) => fence,
            None => {
                log::debug!("Allowing '{}' (whitelist only)", username);
                return LoginVerdict::allow(None, None);
            }
        };

        let current = if fence.needs_lookup() {
            drop(state);
            let current = match fence.describe(&attempt.origin) {
                Ok(place) => place,
                Err(e) => return self.lookup_failed(attempt, e),
            };
            state = self.lock();
            state.reload();
            if !state.whitelist.contains(username) {
                return self.not_whitelisted(attempt);
            }
            current
        } else {
            match fence.describe(&attempt.origin) {
                Ok(descriptor) => descriptor,
                Err(e) => return self.lookup_failed(attempt, e),
            }
        };

        let trusted = state.origins.get(username).map(String::from);
        if let Some(previous) = trusted.as_deref() {
            if !fence.policy.is_close(&current, previous) {
                log::warn!(
                    "Denying '{}': origin drifted from {} to {} ({} policy)",
                    username,
                    previous,
                    current,
                    fence.policy_name()
                );
                return LoginVerdict::deny(DenyReason::OriginDrift, &self.messages.origin_drift)
                    .with_origins(Some(current), trusted);
            }
        }

        if validate_username(username).is_err() {
            log::warn!(
                "Allowing '{}' without tracking: name cannot be stored in the origin file",
                username
            );
            return LoginVerdict::allow(Some(current), trusted);
        }
        state.origins.set(username, &current);
        log::info!("Allowing '{}' from {}", username, current);
        LoginVerdict::allow(Some(current), trusted)
    }

    /// Add a user to the whitelist; returns false if already present
    pub fn whitelist_add(&self, username: &str) -> Result<bool, AdminError> {
        let username = validate_username(username)?;
        let mut state = self.lock();
        state.whitelist.reload();
        let added = state.whitelist.add(&username);
        log::info!("Whitelist add '{}' (changed: {})", username, added);
        Ok(added)
    }

    /// Remove a user from the whitelist; returns false if absent
    pub fn whitelist_remove(&self, username: &str) -> Result<bool, AdminError> {
        let username = validate_username(username)?;
        let mut state = self.lock();
        state.whitelist.reload();
        let removed = state.whitelist.remove(&username);
        log::info!("Whitelist remove '{}' (changed: {})", username, removed);
        Ok(removed)
    }

    /// Forget a user's trusted origin so the next login sets a new baseline
    pub fn reset_origin(&self, username: &str) -> Result<bool, AdminError> {
        let username = validate_username(username)?;
        let mut state = self.lock();
        state.origins.reload();
        let removed = state.origins.remove(&username);
        log::info!("Origin reset for '{}' (changed: {})", username, removed);
        Ok(removed)
    }

    pub fn is_whitelisted(&self, username: &str) -> bool {
        let mut state = self.lock();
        state.whitelist.reload();
        state.whitelist.contains(&normalize_username(username))
    }

    pub fn tracked_origin(&self, username: &str) -> Option<String> {
        let mut state = self.lock();
        state.origins.reload();
        state.origins.get(&normalize_username(username)).map(String::from)
    }

    pub fn whitelist_entries(&self) -> Vec<String> {
        let mut state = self.lock();
        state.whitelist.reload();
        state.whitelist.entries().map(String::from).collect()
    }

    pub fn tracked_origins(&self) -> Vec<(String, String)> {
        let mut state = self.lock();
        state.origins.reload();
        state
            .origins
            .entries()
            .map(|(u, o)| (u.to_string(), o.to_string()))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // The stores are caches of the files, so a poisoned guard is still usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn not_whitelisted(&self, attempt: &LoginAttempt) -> LoginVerdict {
        log::info!("Denying '{}' from {}: not whitelisted", attempt.username, attempt.origin);
        LoginVerdict::deny(DenyReason::NotWhitelisted, &self.messages.not_whitelisted)
    }

    fn lookup_failed(&self, attempt: &LoginAttempt, error: GeoError) -> LoginVerdict {
        match self.on_lookup_failure {
            LookupFailurePolicy::Deny => {
                log::warn!(
                    "Denying '{}': origin lookup for {} failed: {}",
                    attempt.username,
                    attempt.origin,
                    error
                );
                LoginVerdict::deny(DenyReason::LookupFailure, &self.messages.lookup_failure)
            }
            LookupFailurePolicy::Allow => {
                log::warn!(
                    "Allowing '{}' without origin check: lookup for {} failed: {}",
                    attempt.username,
                    attempt.origin,
                    error
                );
                LoginVerdict::allow(None, None)
            }
        }
    }
}

/// Normalize and check that a username fits the file formats
pub fn validate_username(raw: &str) -> Result<String, AdminError> {
    let username = normalize_username(raw);
    if username.is_empty() || username.contains(':') || username.chars().any(char::is_whitespace) {
        return Err(AdminError::InvalidUsername(raw.to_string()));
    }
    Ok(username)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decision;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    /// Resolver answering from a fixed table
    struct TableResolver {
        places: HashMap<IpAddr, &'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl TableResolver {
        fn new(entries: &[(&str, &'static str)]) -> Self {
            TableResolver {
                places: entries
                    .iter()
                    .map(|(ip, place)| (IpAddr::from_str(ip).unwrap(), *place))
                    .collect(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl GeoResolver for TableResolver {
        fn resolve(&self, ip: &IpAddr) -> Result<String, GeoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.places
                .get(ip)
                .map(|p| p.to_string())
                .ok_or(GeoError::NoPlace(*ip))
        }
    }

    fn open_engine(dir: &TempDir) -> AuthorizationEngine {
        AuthorizationEngine::new(
            WhitelistStore::open(dir.path().join("whitelist.txt")),
            OriginTracker::open(dir.path().join("ip.json")),
        )
    }

    fn city_engine(dir: &TempDir) -> AuthorizationEngine {
        let resolver = TableResolver::new(&[
            ("1.1.1.1", "Paris"),
            ("1.1.1.2", "Paris"),
            ("2.2.2.2", "Berlin"),
        ]);
        open_engine(dir).with_fence(Fence::city(Box::new(resolver)))
    }

    fn login(engine: &AuthorizationEngine, user: &str, origin: &str) -> LoginVerdict {
        engine.evaluate_login(&LoginAttempt::new(user, origin))
    }

    #[test]
    fn test_unknown_user_denied() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir).with_fence(Fence::subnet());

        let verdict = login(&engine, "mallory", "10.0.0.5");
        assert_eq!(verdict.decision, Decision::Deny(DenyReason::NotWhitelisted));
        assert!(verdict.message.unwrap().contains("discord.gg/PN8egFY3ap"));
        assert!(engine.tracked_origin("mallory").is_none());
    }

    #[test]
    fn test_first_login_sets_baseline() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir).with_fence(Fence::subnet());
        engine.whitelist_add("alice").unwrap();

        let verdict = login(&engine, "alice", "10.0.0.5");
        assert_eq!(verdict.decision, Decision::Allow);
        assert_eq!(verdict.current_origin.as_deref(), Some("10.0.0.5"));
        assert!(verdict.trusted_origin.is_none());
        assert_eq!(engine.tracked_origin("alice").as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn test_membership_is_case_insensitive() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);
        engine.whitelist_add("Alice").unwrap();

        assert_eq!(login(&engine, "alice", "10.0.0.5").decision, Decision::Allow);
        assert_eq!(login(&engine, "ALICE", "10.0.0.5").decision, Decision::Allow);
    }

    #[test]
    fn test_whitelist_only_does_not_track() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);
        engine.whitelist_add("alice").unwrap();

        assert_eq!(login(&engine, "alice", "10.0.0.5").decision, Decision::Allow);
        assert_eq!(login(&engine, "alice", "99.1.2.3").decision, Decision::Allow);
        assert!(engine.tracked_origin("alice").is_none());
    }

    #[test]
    fn test_subnet_same_24_allows_and_rebaselines() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir).with_fence(Fence::subnet());
        engine.whitelist_add("alice").unwrap();
        login(&engine, "alice", "10.0.0.5");

        let verdict = login(&engine, "alice", "10.0.0.200");
        assert_eq!(verdict.decision, Decision::Allow);
        assert_eq!(verdict.trusted_origin.as_deref(), Some("10.0.0.5"));
        assert_eq!(engine.tracked_origin("alice").as_deref(), Some("10.0.0.200"));
    }

    #[test]
    fn test_subnet_drift_denies_and_keeps_baseline() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir).with_fence(Fence::subnet());
        engine.whitelist_add("alice").unwrap();
        login(&engine, "alice", "10.0.0.5");

        let verdict = login(&engine, "alice", "10.0.1.5");
        assert_eq!(verdict.decision, Decision::Deny(DenyReason::OriginDrift));
        assert_eq!(
            verdict.message.as_deref(),
            Some("Your location has changed significantly. You have been kicked.")
        );
        assert_eq!(engine.tracked_origin("alice").as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn test_subnet_malformed_origin_fails_closed() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir).with_fence(Fence::subnet());
        engine.whitelist_add("alice").unwrap();
        login(&engine, "alice", "10.0.0.5");

        let verdict = login(&engine, "alice", "10.0.0");
        assert_eq!(verdict.decision, Decision::Deny(DenyReason::OriginDrift));
    }

    #[test]
    fn test_city_same_place_allows() {
        let dir = tempdir().unwrap();
        let engine = city_engine(&dir);
        engine.whitelist_add("alice").unwrap();

        assert_eq!(login(&engine, "alice", "1.1.1.1").decision, Decision::Allow);
        assert_eq!(login(&engine, "alice", "1.1.1.2").decision, Decision::Allow);
        assert_eq!(engine.tracked_origin("alice").as_deref(), Some("Paris"));
    }

    #[test]
    fn test_city_different_place_denies() {
        let dir = tempdir().unwrap();
        let engine = city_engine(&dir);
        engine.whitelist_add("alice").unwrap();
        login(&engine, "alice", "1.1.1.1");

        let verdict = login(&engine, "alice", "2.2.2.2");
        assert_eq!(verdict.decision, Decision::Deny(DenyReason::OriginDrift));
        assert_eq!(verdict.current_origin.as_deref(), Some("Berlin"));
        assert_eq!(verdict.trusted_origin.as_deref(), Some("Paris"));
        assert_eq!(engine.tracked_origin("alice").as_deref(), Some("Paris"));
    }

    #[test]
    fn test_lookup_failure_denies_by_default() {
        let dir = tempdir().unwrap();
        let engine = city_engine(&dir);
        engine.whitelist_add("alice").unwrap();

        let verdict = login(&engine, "alice", "9.9.9.9");
        assert_eq!(verdict.decision, Decision::Deny(DenyReason::LookupFailure));
        assert!(engine.tracked_origin("alice").is_none());

        let verdict = login(&engine, "alice", "not-an-ip");
        assert_eq!(verdict.decision, Decision::Deny(DenyReason::LookupFailure));
    }

    #[test]
    fn test_lookup_failure_allow_policy_keeps_baseline() {
        let dir = tempdir().unwrap();
        let engine = city_engine(&dir).with_lookup_failure_policy(LookupFailurePolicy::Allow);
        engine.whitelist_add("alice").unwrap();
        login(&engine, "alice", "1.1.1.1");

        let verdict = login(&engine, "alice", "9.9.9.9");
        assert_eq!(verdict.decision, Decision::Allow);
        assert_eq!(engine.tracked_origin("alice").as_deref(), Some("Paris"));
    }

    #[test]
    fn test_no_lookup_for_unknown_users() {
        let dir = tempdir().unwrap();
        let resolver = TableResolver::new(&[("1.1.1.1", "Paris")]);
        let calls = Arc::clone(&resolver.calls);
        let engine = open_engine(&dir).with_fence(Fence::city(Box::new(resolver)));

        login(&engine, "mallory", "1.1.1.1");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reset_origin_allows_any_origin() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir).with_fence(Fence::subnet());
        engine.whitelist_add("alice").unwrap();
        login(&engine, "alice", "10.0.0.5");
        assert!(!login(&engine, "alice", "172.16.4.4").decision.is_allowed());

        assert!(engine.reset_origin("Alice").unwrap());
        assert!(!engine.reset_origin("alice").unwrap());

        let verdict = login(&engine, "alice", "172.16.4.4");
        assert_eq!(verdict.decision, Decision::Allow);
        assert_eq!(engine.tracked_origin("alice").as_deref(), Some("172.16.4.4"));
    }

    #[test]
    fn test_add_twice_keeps_one_entry() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        assert!(engine.whitelist_add("Alice").unwrap());
        assert!(!engine.whitelist_add("alice ").unwrap());
        assert_eq!(engine.whitelist_entries(), vec!["alice".to_string()]);
    }

    #[test]
    fn test_remove_revokes_access() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);
        engine.whitelist_add("alice").unwrap();
        assert!(engine.whitelist_remove("ALICE").unwrap());

        let verdict = login(&engine, "alice", "10.0.0.5");
        assert_eq!(verdict.decision, Decision::Deny(DenyReason::NotWhitelisted));
    }

    #[test]
    fn test_external_file_edits_apply_on_next_login() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir).with_fence(Fence::subnet());

        fs::write(dir.path().join("whitelist.txt"), "Bob\n").unwrap();
        fs::write(dir.path().join("ip.json"), "bob:10.0.0.5\n").unwrap();

        assert!(login(&engine, "bob", "10.0.0.9").decision.is_allowed());
        assert!(!login(&engine, "bob", "10.9.0.9").decision.is_allowed());
    }

    #[test]
    fn test_invalid_usernames_rejected() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        for bad in ["", "   ", "a:b", "two words"] {
            assert_eq!(
                engine.whitelist_add(bad),
                Err(AdminError::InvalidUsername(bad.to_string()))
            );
        }
        assert!(engine.whitelist_entries().is_empty());
    }

    #[test]
    fn test_from_config_subnet() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("username-whitelist");
        config.fence.mode = FenceMode::Subnet;

        let engine = AuthorizationEngine::from_config(&config).unwrap();
        assert_eq!(engine.fence().map(Fence::policy_name), Some("subnet"));
        assert!(config.storage.whitelist_path().exists());
        assert!(config.storage.origins_path().exists());
    }

    #[test]
    fn test_http_lookup_failure_keeps_baseline() {
        use crate::geolocation::http::testing;

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("whitelist.txt"), "alice\n").unwrap();
        fs::write(dir.path().join("ip.json"), "alice:Paris\n").unwrap();
        let endpoint = testing::serve_once(testing::SERVER_ERROR);
        let resolver = testing::local_resolver(&endpoint, Duration::from_millis(500));
        let engine = open_engine(&dir).with_fence(Fence::city(Box::new(resolver)));

        let verdict = login(&engine, "alice", "8.8.8.8");
        assert_eq!(verdict.decision, Decision::Deny(DenyReason::LookupFailure));
        assert_eq!(engine.tracked_origin("alice").as_deref(), Some("Paris"));
    }

    #[test]
    fn test_unstorable_name_allowed_without_tracking() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("whitelist.txt"), "a:b\n").unwrap();
        let engine = open_engine(&dir).with_fence(Fence::subnet());

        let verdict = login(&engine, "a:b", "10.0.0.5");
        assert_eq!(verdict.decision, Decision::Allow);
        assert!(engine.tracked_origins().is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("ip.json")).unwrap(), "");
    }

    #[test]
    fn test_hand_built_attempt_is_normalized() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir).with_fence(Fence::subnet());
        engine.whitelist_add("alice").unwrap();

        let attempt = LoginAttempt {
            username: " Alice ".to_string(),
            origin: "10.0.0.5".to_string(),
        };
        assert_eq!(engine.evaluate_login(&attempt).decision, Decision::Allow);
        assert_eq!(engine.tracked_origin("alice").as_deref(), Some("10.0.0.5"));
        assert_eq!(engine.tracked_origins().len(), 1);
    }

    #[test]
    fn test_concurrent_logins_keep_files_consistent() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(open_engine(&dir).with_fence(Fence::subnet()));
        for i in 0..8 {
            engine.whitelist_add(&format!("player{}", i)).unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    let user = format!("player{}", i);
                    for _ in 0..5 {
                        let verdict = engine.evaluate_login(&LoginAttempt::new(&user, &format!("10.0.{}.1", i)));
                        assert!(verdict.decision.is_allowed());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.tracked_origins().len(), 8);
        assert_eq!(engine.tracked_origin("player3").as_deref(), Some("10.0.3.1"));
    }
}
