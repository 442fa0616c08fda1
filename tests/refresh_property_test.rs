/// Property tests: a returned access token always outlives the refresh margin
use async_trait::async_trait;
use proptest::prelude::*;
use recruit_gateway::{
    clock::ManualClock,
    config::{IntegrationConfig, IntegrationKind, OAuthSettings},
    error::AppError,
    oauth::{MemoryTokenStore, OAuthManager, OAuthProvider, TokenRecord, TokenResponse, TokenStore},
};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const START: i64 = 1_700_000_000;
const MARGIN: i64 = 300;

/// Token endpoint that hands out tokens with scripted lifetimes
struct ScriptedProvider {
    lifetimes: Mutex<VecDeque<i64>>,
    issued: AtomicUsize,
}

#[async_trait]
impl OAuthProvider for ScriptedProvider {
    fn authorization_url(&self, state: &str) -> Result<String, AppError> {
        Ok(format!("https://auth.example.com/authorize?state={}", state))
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenResponse, AppError> {
        Err(AppError::auth_exchange("not used"))
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse, AppError> {
        let expires_in = {
            let mut lifetimes = self.lifetimes.lock().unwrap();
            let next = lifetimes.pop_front().unwrap_or(3600);
            lifetimes.push_back(next);
            next
        };
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;

        TokenResponse::parse(&format!(
            r#"{{"access_token":"tok{}","expires_in":{}}}"#,
            n, expires_in
        ))
    }
}

#[derive(Debug, Clone)]
enum Op {
    Advance(i64),
    Get,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0i64..5_000).prop_map(Op::Advance),
        Just(Op::Get),
    ]
}

async fn run_ops(ops: Vec<Op>, lifetimes: Vec<i64>) -> Result<(), TestCaseError> {
    let store = Arc::new(MemoryTokenStore::new());
    store
        .put(&TokenRecord {
            user_id: "user-1".to_string(),
            integration: IntegrationKind::LinkedIn,
            access_token: "tok0".to_string(),
            refresh_token: Some("ref0".to_string()),
            expires_at: START + 3_600,
            scopes: BTreeSet::new(),
            token_type: "Bearer".to_string(),
            created_at: START,
            last_refreshed_at: START,
        })
        .await
        .unwrap();

    let clock = Arc::new(ManualClock::new(START));
    let provider = Arc::new(ScriptedProvider {
        lifetimes: Mutex::new(lifetimes.into()),
        issued: AtomicUsize::new(0),
    });

    let mut config = IntegrationConfig::new(
        IntegrationKind::LinkedIn,
        "client",
        "secret",
        "https://dashboard.example.com/oauth/linkedin",
    );
    config.refresh_margin_seconds = Some(MARGIN);

    let manager = OAuthManager::new(&config, &OAuthSettings::default(), store.clone(), provider)
        .with_clock(clock.clone());

    for op in ops {
        match op {
            Op::Advance(seconds) => clock.advance(seconds),
            Op::Get => {
                let now = recruit_gateway::clock::Clock::now(clock.as_ref());
                if let Ok(Some(token)) = manager.get_valid_access_token("user-1").await {
                    let stored = store
                        .get("user-1", IntegrationKind::LinkedIn)
                        .await
                        .unwrap()
                        .unwrap();
                    prop_assert_eq!(&stored.access_token, &token);
                    prop_assert!(
                        stored.expires_at - now >= MARGIN,
                        "token {} has {}s left at {}",
                        token,
                        stored.expires_at - now,
                        now
                    );
                }
            }
        }
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_returned_token_outlives_margin(
        ops in prop::collection::vec(op_strategy(), 1..40),
        lifetimes in prop::collection::vec(1i64..7_200, 1..8),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(run_ops(ops, lifetimes))?;
    }
}
