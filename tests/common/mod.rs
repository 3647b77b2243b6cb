//! Shared fixtures: in-memory libSQL and cache plus stub collaborators.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use actor_onboarding::cache::MemoryCache;
use actor_onboarding::collaborators::{
    Catalog, CompletionEffects, IdentityProvider, ResolvedZip, WorkOrder, WorkOrderLookup,
};
use actor_onboarding::config::{SearchConfig, SessionConfig};
use actor_onboarding::error::CollaboratorError;
use actor_onboarding::matching::DealerMatcher;
use actor_onboarding::messaging::{MessageBus, OutboundMessage};
use actor_onboarding::onboarding::{OnboardingDeps, OnboardingManager};
use actor_onboarding::profile::{
    Account, Customer, Dealer, Expert, ReferenceCounty, ReferenceState, Role,
};
use actor_onboarding::session::{Clock, SessionDeps, SessionWorkflow};
use actor_onboarding::store::{LibSqlBackend, NewActor, ProfileStore};

/// Upper bound on waiting for a background dispatch.
const DISPATCH_WAIT: Duration = Duration::from_secs(2);

// ── Clock ───────────────────────────────────────────────────────────

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

fn unavailable(service: &str) -> CollaboratorError {
    CollaboratorError::request_failed(service, "timed out")
}

// ── Catalog ─────────────────────────────────────────────────────────

/// Alabama with two counties; brands acme, zenith, orion.
pub struct StubCatalog;

#[async_trait]
impl Catalog for StubCatalog {
    async fn reference_states(&self) -> Result<Vec<ReferenceState>, CollaboratorError> {
        Ok(vec![ReferenceState {
            name: "Alabama".into(),
            counties: vec![
                ReferenceCounty {
                    name: "Autauga County".into(),
                    zip_codes: vec!["36003".into(), "36006".into()],
                },
                ReferenceCounty {
                    name: "Baldwin County".into(),
                    zip_codes: vec!["36507".into()],
                },
            ],
        }])
    }

    async fn resolve_zip(&self, zip_code: &str) -> Result<Option<ResolvedZip>, CollaboratorError> {
        let county = match zip_code {
            "36003" | "36006" => "Autauga County",
            "36507" => "Baldwin County",
            _ => return Ok(None),
        };
        Ok(Some(ResolvedZip {
            state: "Alabama".into(),
            county: county.into(),
        }))
    }

    async fn brand_codes(&self) -> Result<Vec<String>, CollaboratorError> {
        Ok(vec!["acme".into(), "zenith".into(), "orion".into()])
    }
}

// ── Work orders ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct StubWorkOrders {
    active: Mutex<Vec<Uuid>>,
    calls: Mutex<Vec<Vec<Uuid>>>,
}

impl StubWorkOrders {
    pub fn set_active(&self, ids: Vec<Uuid>) {
        *self.active.lock().unwrap() = ids;
    }

    pub fn calls(&self) -> Vec<Vec<Uuid>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkOrderLookup for StubWorkOrders {
    async fn active_work_orders(
        &self,
        location_ids: &[Uuid],
    ) -> Result<Vec<WorkOrder>, CollaboratorError> {
        self.calls.lock().unwrap().push(location_ids.to_vec());
        let active = self.active.lock().unwrap();
        Ok(location_ids
            .iter()
            .filter(|id| active.contains(id))
            .map(|id| WorkOrder {
                id: format!("wo-{id}"),
                business_location_id: *id,
                status: "in_progress".into(),
            })
            .collect())
    }
}

// ── Completion effects ──────────────────────────────────────────────

/// Counts successful effects. `fail_next` makes the next call fail once.
#[derive(Default)]
pub struct StubEffects {
    pub customer_accounts: AtomicUsize,
    pub dealer_accounts: AtomicUsize,
    pub reminders: AtomicUsize,
    pub attempts: AtomicUsize,
    pub fail_next: AtomicBool,
}

impl StubEffects {
    fn attempt(&self) -> Result<(), CollaboratorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(unavailable("effects"));
        }
        Ok(())
    }
}

#[async_trait]
impl CompletionEffects for StubEffects {
    async fn create_customer_financial_account(
        &self,
        customer: &Customer,
    ) -> Result<String, CollaboratorError> {
        self.attempt()?;
        self.customer_accounts.fetch_add(1, Ordering::SeqCst);
        Ok(format!("fin-{}", customer.id))
    }

    async fn create_dealer_financial_account(
        &self,
        dealer: &Dealer,
    ) -> Result<String, CollaboratorError> {
        self.attempt()?;
        self.dealer_accounts.fetch_add(1, Ordering::SeqCst);
        Ok(format!("fin-{}", dealer.id))
    }

    async fn seed_expert_reminders(&self, _expert: &Expert) -> Result<(), CollaboratorError> {
        self.attempt()?;
        self.reminders.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Message bus ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingBus {
    sent: Mutex<Vec<(String, OutboundMessage)>>,
}

impl RecordingBus {
    pub fn sent(&self) -> Vec<(String, OutboundMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until at least `count` messages have arrived.
    pub async fn wait_for(&self, count: usize) -> Vec<(String, OutboundMessage)> {
        let deadline = tokio::time::Instant::now() + DISPATCH_WAIT;
        loop {
            let sent = self.sent();
            if sent.len() >= count || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// The OTP carried by the most recent OTP email.
    pub async fn last_otp(&self, count: usize) -> String {
        let sent = self.wait_for(count).await;
        sent.iter()
            .rev()
            .find_map(|(_, m)| match m {
                OutboundMessage::RegistrationOtp { otp, .. }
                | OutboundMessage::PasswordResetOtp { otp, .. } => Some(otp.clone()),
                _ => None,
            })
            .expect("no OTP email was sent")
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn send_to_queue(
        &self,
        queue: &str,
        message: &OutboundMessage,
    ) -> Result<(), CollaboratorError> {
        self.sent
            .lock()
            .unwrap()
            .push((format!("queue:{queue}"), message.clone()));
        Ok(())
    }

    async fn send_to_topic(
        &self,
        topic: &str,
        message: &OutboundMessage,
    ) -> Result<(), CollaboratorError> {
        self.sent
            .lock()
            .unwrap()
            .push((format!("topic:{topic}"), message.clone()));
        Ok(())
    }
}

// ── Identity provider ───────────────────────────────────────────────

#[derive(Default)]
pub struct StubIdentity {
    pub users: Mutex<Vec<(String, Role)>>,
    pub resets: Mutex<Vec<(String, String)>>,
    pub fail_next: AtomicBool,
}

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn create_user(
        &self,
        account: &Account,
        _password: &SecretString,
        role: Role,
    ) -> Result<(), CollaboratorError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(unavailable("identity"));
        }
        self.users
            .lock()
            .unwrap()
            .push((account.email.clone(), role));
        Ok(())
    }

    async fn reset_password(
        &self,
        email: &str,
        new_password: &SecretString,
    ) -> Result<(), CollaboratorError> {
        self.resets
            .lock()
            .unwrap()
            .push((email.to_string(), new_password.expose_secret().to_string()));
        Ok(())
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub store: Arc<LibSqlBackend>,
    pub cache: Arc<MemoryCache>,
    pub work_orders: Arc<StubWorkOrders>,
    pub effects: Arc<StubEffects>,
    pub bus: Arc<RecordingBus>,
    pub identity: Arc<StubIdentity>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new() -> Self {
        Self {
            store: Arc::new(LibSqlBackend::new_memory().await.unwrap()),
            cache: Arc::new(MemoryCache::new()),
            work_orders: Arc::new(StubWorkOrders::default()),
            effects: Arc::new(StubEffects::default()),
            bus: Arc::new(RecordingBus::default()),
            identity: Arc::new(StubIdentity::default()),
            clock: Arc::new(ManualClock::new(Utc::now())),
        }
    }

    pub fn manager(&self) -> OnboardingManager {
        OnboardingManager::new(OnboardingDeps {
            store: self.store.clone(),
            catalog: Arc::new(StubCatalog),
            work_orders: self.work_orders.clone(),
            effects: self.effects.clone(),
            bus: self.bus.clone(),
            cache: self.cache.clone(),
        })
    }

    pub fn matcher(&self) -> DealerMatcher {
        DealerMatcher::new(
            Arc::new(StubCatalog),
            self.store.clone(),
            self.cache.clone(),
            SearchConfig::default(),
        )
    }

    pub fn sessions(&self) -> SessionWorkflow {
        let clock: Arc<dyn Clock> = self.clock.clone();
        SessionWorkflow::with_clock(
            SessionDeps {
                cache: self.cache.clone(),
                bus: self.bus.clone(),
                identity: self.identity.clone(),
                store: self.store.clone(),
            },
            SessionConfig::default(),
            clock,
        )
    }

    pub async fn dealer(&self, email: &str) -> Uuid {
        let dealer = Dealer::new(Account::new("Dee", "Ler", email, Role::Dealer));
        let account_id = dealer.account.id;
        self.store
            .create_actor(&NewActor::Dealer(dealer))
            .await
            .unwrap();
        account_id
    }

    pub async fn customer(&self, email: &str) -> Uuid {
        let customer = Customer::new(Account::new("Cus", "Tomer", email, Role::Customer));
        let account_id = customer.account.id;
        self.store
            .create_actor(&NewActor::Customer(customer))
            .await
            .unwrap();
        account_id
    }

    pub async fn expert(&self, email: &str) -> Uuid {
        let expert = Expert::new(Account::new("Ex", "Pert", email, Role::Expert));
        let account_id = expert.account.id;
        self.store
            .create_actor(&NewActor::Expert(expert))
            .await
            .unwrap();
        account_id
    }
}
