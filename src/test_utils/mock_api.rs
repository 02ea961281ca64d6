//! An in-process stand-in for the REST API, served on a random local port.
//!
//! Every handler counts its hits under "METHOD /route/{param}" and the
//! [MockState] setters inject the failure modes the client has to handle.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{Path, Query, RawQuery, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde_json::{Value, json};
use time::{OffsetDateTime, macros::datetime};

use crate::{
    CSRF_HEADER, Category, ClientConfig, RetryPolicy, Transaction, TransactionId, TransactionType,
    endpoints,
};

/// The password the mock accepts for every account.
const PASSWORD: &str = "hunter2";
/// An email address the mock reports as already registered.
pub(crate) const TAKEN_EMAIL: &str = "taken@example.com";

/// A running mock API.
pub(crate) struct MockApi {
    pub(crate) base_url: String,
    pub(crate) state: Arc<MockState>,
}

impl MockApi {
    /// A config for the mock with retries that do not wait.
    pub(crate) fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::for_base_url(&self.base_url);
        config.retry = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::ZERO,
        };

        config
    }
}

/// The recorded requests and injected behavior of a [MockApi].
#[derive(Debug)]
pub(crate) struct MockState {
    hits: Mutex<HashMap<String, usize>>,
    csrf_issued: AtomicUsize,
    csrf_available: AtomicBool,
    mutation_csrf_headers: Mutex<Vec<Option<String>>>,
    forbidden_mutations: AtomicUsize,
    profile_status: Mutex<Option<StatusCode>>,
    profile_cookies: Mutex<Vec<Option<String>>>,
    failing_reads: AtomicUsize,
    reads_unauthorized: AtomicBool,
    list_delay: Mutex<Duration>,
    last_query: Mutex<Option<String>>,
    transactions: Mutex<Vec<Transaction>>,
    next_id: AtomicUsize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            hits: Mutex::default(),
            csrf_issued: AtomicUsize::new(0),
            csrf_available: AtomicBool::new(true),
            mutation_csrf_headers: Mutex::default(),
            forbidden_mutations: AtomicUsize::new(0),
            profile_status: Mutex::default(),
            profile_cookies: Mutex::default(),
            failing_reads: AtomicUsize::new(0),
            reads_unauthorized: AtomicBool::new(false),
            list_delay: Mutex::new(Duration::ZERO),
            last_query: Mutex::default(),
            transactions: Mutex::default(),
            next_id: AtomicUsize::new(1),
        }
    }
}

impl MockState {
    /// The number of requests to `route`, e.g. "GET /transactions".
    pub(crate) fn hits(&self, route: &str) -> usize {
        self.hits.lock().unwrap().get(route).copied().unwrap_or(0)
    }

    pub(crate) fn csrf_tokens_issued(&self) -> usize {
        self.csrf_issued.load(Ordering::SeqCst)
    }

    /// Make `/csrf-token` respond with 500.
    pub(crate) fn set_csrf_available(&self, available: bool) {
        self.csrf_available.store(available, Ordering::SeqCst);
    }

    /// The CSRF header of every CSRF checked request, in order.
    pub(crate) fn mutation_csrf_headers(&self) -> Vec<Option<String>> {
        self.mutation_csrf_headers.lock().unwrap().clone()
    }

    /// Reject the next `count` CSRF checked requests with 403.
    pub(crate) fn forbid_next_mutations(&self, count: usize) {
        self.forbidden_mutations.store(count, Ordering::SeqCst);
    }

    /// Answer `/profile` with `status` regardless of cookies. 200 returns the test user.
    pub(crate) fn set_profile_status(&self, status: StatusCode) {
        *self.profile_status.lock().unwrap() = Some(status);
    }

    /// The `Cookie` header of every `/profile` request, in order.
    pub(crate) fn profile_cookies(&self) -> Vec<Option<String>> {
        self.profile_cookies.lock().unwrap().clone()
    }

    /// Answer the next `count` transaction reads with 500.
    pub(crate) fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Answer every transaction read with 401.
    pub(crate) fn set_reads_unauthorized(&self, unauthorized: bool) {
        self.reads_unauthorized.store(unauthorized, Ordering::SeqCst);
    }

    /// Wait `delay` before answering list reads.
    pub(crate) fn delay_lists(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = delay;
    }

    /// The raw query string of the last `/transactions-query/` request.
    pub(crate) fn last_query(&self) -> Option<String> {
        self.last_query.lock().unwrap().clone()
    }

    /// Store `count` transactions with IDs "tx-1" to "tx-{count}". Odd ones
    /// are food expenses and even ones are bills.
    pub(crate) fn seed_transactions(&self, count: usize) {
        let mut transactions = self.transactions.lock().unwrap();

        for _ in 0..count {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let created = datetime!(2024-01-01 09:00 UTC) + time::Duration::days(n as i64);
            let category = if n % 2 == 1 {
                Category::Food
            } else {
                Category::Bills
            };

            transactions.push(Transaction {
                id: TransactionId::new(format!("tx-{n}")),
                amount: n as f64 * 10.0,
                transaction_type: TransactionType::Expense,
                category: category.key().to_owned(),
                description: Some(format!("Transaction {n}")),
                note: None,
                user_id: "user-1".to_owned(),
                created,
                updated: created,
            });
        }
    }

    fn hit(&self, route: &str) {
        *self.hits.lock().unwrap().entry(route.to_owned()).or_insert(0) += 1;
    }

    /// Records the CSRF header and returns the 403 response if the request is rejected.
    fn check_csrf(&self, headers: &HeaderMap) -> Option<Response> {
        let token = headers
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let has_token = token.is_some();
        self.mutation_csrf_headers.lock().unwrap().push(token);

        let forbidden = self
            .forbidden_mutations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                count.checked_sub(1)
            })
            .is_ok();

        (forbidden || !has_token).then(|| message(StatusCode::FORBIDDEN, "invalid CSRF token"))
    }

    /// Returns the injected failure for a transaction read, if any.
    fn check_read(&self) -> Option<Response> {
        if self.reads_unauthorized.load(Ordering::SeqCst) {
            return Some(message(StatusCode::UNAUTHORIZED, "Unauthorized"));
        }

        self.failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                count.checked_sub(1)
            })
            .is_ok()
            .then(|| message(StatusCode::INTERNAL_SERVER_ERROR, "database unavailable"))
    }

    async fn wait_for_list(&self) {
        let delay = *self.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Serve a fresh mock API on a random port.
pub(crate) async fn spawn_mock_api() -> MockApi {
    let state = Arc::new(MockState::default());

    let app = Router::new()
        .route(endpoints::CSRF_TOKEN, get(csrf_token))
        .route(endpoints::PROFILE, get(profile))
        .route(endpoints::LOG_IN, post(log_in))
        .route(endpoints::REGISTER, post(register))
        .route(endpoints::LOG_OUT, post(log_out))
        .route(
            endpoints::TRANSACTIONS,
            get(list_transactions).post(create_transaction),
        )
        .route(endpoints::TRANSACTIONS_QUERY, get(query_transactions))
        .route(endpoints::TRANSACTION, delete(delete_transaction))
        .route(
            endpoints::TRANSACTION_V1,
            get(get_transaction).put(update_transaction),
        )
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("could not bind mock API listener");
    let address = listener
        .local_addr()
        .expect("could not get mock API address");

    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock API stopped unexpectedly");
    });

    MockApi {
        base_url: format!("http://{address}"),
        state,
    }
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

fn test_user() -> Value {
    json!({ "user_id": "user-1", "name": "Alice", "email": "alice@example.com" })
}

async fn csrf_token(State(state): State<Arc<MockState>>) -> Response {
    state.hit("GET /csrf-token");

    if !state.csrf_available.load(Ordering::SeqCst) {
        return message(StatusCode::INTERNAL_SERVER_ERROR, "token store unavailable");
    }

    let n = state.csrf_issued.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "csrf_token": format!("token-{n}") })).into_response()
}

async fn profile(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.hit("GET /profile");

    let cookie = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let signed_in = cookie
        .as_deref()
        .is_some_and(|cookie| cookie.contains("auth_token="));
    state.profile_cookies.lock().unwrap().push(cookie);

    let status = *state.profile_status.lock().unwrap();
    match status {
        Some(status) if status.is_success() => {
            (status, Json(json!({ "user": test_user() }))).into_response()
        }
        Some(status) => message(status, "profile unavailable"),
        None if signed_in => Json(json!({ "user": test_user() })).into_response(),
        None => message(StatusCode::UNAUTHORIZED, "Unauthorized"),
    }
}

async fn log_in(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.hit("POST /login");

    if body["password"] != PASSWORD {
        return message(StatusCode::UNAUTHORIZED, "Invalid email or password");
    }

    let user = json!({
        "id": "user-1",
        "name": "Alice",
        "email": body["email"],
        "created_at": "2024-01-01 09:00:00.000Z",
        "updated_at": "2024-01-01 09:00:00.000Z"
    });

    (
        [(header::SET_COOKIE, "auth_token=signed-in; Path=/; HttpOnly")],
        Json(json!({ "message": "Login successful", "data": user })),
    )
        .into_response()
}

async fn register(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.hit("POST /register");

    if body["email"] == TAKEN_EMAIL {
        return message(StatusCode::BAD_REQUEST, "email already registered");
    }

    let user = json!({
        "id": "user-2",
        "name": body["name"],
        "email": body["email"],
        "created_at": "2024-02-01T12:00:00Z",
        "updated_at": "2024-02-01T12:00:00Z"
    });

    (
        StatusCode::CREATED,
        Json(json!({ "message": "User registered", "data": user })),
    )
        .into_response()
}

async fn log_out(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.hit("POST /logout");

    if let Some(rejection) = state.check_csrf(&headers) {
        return rejection;
    }

    (
        [(header::SET_COOKIE, "auth_token=; Path=/; Max-Age=0")],
        StatusCode::OK,
    )
        .into_response()
}

async fn list_transactions(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.hit("GET /transactions");

    if let Some(failure) = state.check_read() {
        return failure;
    }
    state.wait_for_list().await;

    let transactions = state.transactions.lock().unwrap().clone();
    Json(json!({ "transactions": paginate(transactions, &params) })).into_response()
}

async fn query_transactions(
    State(state): State<Arc<MockState>>,
    RawQuery(raw_query): RawQuery,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.hit("GET /transactions-query/");
    *state.last_query.lock().unwrap() = raw_query;

    if let Some(failure) = state.check_read() {
        return failure;
    }
    state.wait_for_list().await;

    let mut transactions = state.transactions.lock().unwrap().clone();

    if let Some(categories) = params.get("category") {
        let categories: Vec<&str> = categories.split(',').collect();
        transactions.retain(|transaction| categories.contains(&transaction.category.as_str()));
    }
    if let Some(search) = params.get("search") {
        let search = search.to_lowercase();
        transactions.retain(|transaction| {
            transaction
                .description
                .as_deref()
                .is_some_and(|description| description.to_lowercase().contains(&search))
        });
    }
    match params.get("order").map(String::as_str) {
        Some("amount_asc") => transactions.sort_by(|a, b| a.amount.total_cmp(&b.amount)),
        Some("amount_desc") => transactions.sort_by(|a, b| b.amount.total_cmp(&a.amount)),
        Some("date_asc") => transactions.sort_by_key(|transaction| transaction.created),
        Some("date_desc") => {
            transactions.sort_by_key(|transaction| std::cmp::Reverse(transaction.created))
        }
        _ => {}
    }

    Json(json!({ "transactions": paginate(transactions, &params) })).into_response()
}

fn paginate(transactions: Vec<Transaction>, params: &HashMap<String, String>) -> Vec<Transaction> {
    let parse = |name: &str, default: usize| {
        params
            .get(name)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    };

    transactions
        .into_iter()
        .skip(parse("offset", 0))
        .take(parse("limit", 10))
        .collect()
}

async fn create_transaction(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.hit("POST /transactions");

    if let Some(rejection) = state.check_csrf(&headers) {
        return rejection;
    }

    let Some(amount) = body["amount"].as_f64() else {
        return message(StatusCode::BAD_REQUEST, "amount is required");
    };
    let Some(category) = body["category"]
        .as_str()
        .filter(|category| category.parse::<Category>().is_ok())
    else {
        return message(StatusCode::BAD_REQUEST, "invalid category");
    };
    let Ok(transaction_type) = serde_json::from_value(body["type"].clone()) else {
        return message(StatusCode::BAD_REQUEST, "type must be income or expense");
    };

    let n = state.next_id.fetch_add(1, Ordering::SeqCst);
    let now = OffsetDateTime::now_utc();
    let transaction = Transaction {
        id: TransactionId::new(format!("tx-{n}")),
        amount,
        transaction_type,
        category: category.to_owned(),
        description: body["description"].as_str().map(str::to_owned),
        note: body["note"].as_str().map(str::to_owned),
        user_id: "user-1".to_owned(),
        created: now,
        updated: now,
    };
    state.transactions.lock().unwrap().push(transaction.clone());

    (
        StatusCode::CREATED,
        Json(json!({ "message": "Transaction created", "transaction": transaction })),
    )
        .into_response()
}

async fn get_transaction(State(state): State<Arc<MockState>>, Path(id): Path<String>) -> Response {
    state.hit("GET /api/v1/transactions/{id}");

    if let Some(failure) = state.check_read() {
        return failure;
    }

    let transactions = state.transactions.lock().unwrap();
    match transactions
        .iter()
        .find(|transaction| transaction.id.as_str() == id)
    {
        Some(transaction) => Json(json!({ "transaction": transaction })).into_response(),
        None => message(StatusCode::NOT_FOUND, "Transaction not found"),
    }
}

async fn update_transaction(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.hit("PUT /api/v1/transactions/{id}");

    if let Some(rejection) = state.check_csrf(&headers) {
        return rejection;
    }

    let mut transactions = state.transactions.lock().unwrap();
    let Some(transaction) = transactions
        .iter_mut()
        .find(|transaction| transaction.id.as_str() == id)
    else {
        return message(StatusCode::NOT_FOUND, "Transaction not found");
    };

    if let Some(amount) = body["amount"].as_f64() {
        transaction.amount = amount;
    }
    if let Ok(transaction_type) = serde_json::from_value(body["type"].clone()) {
        transaction.transaction_type = transaction_type;
    }
    if let Some(category) = body["category"].as_str() {
        transaction.category = category.to_owned();
    }
    if let Some(description) = body["description"].as_str() {
        transaction.description = Some(description.to_owned());
    }
    if let Some(note) = body["note"].as_str() {
        transaction.note = Some(note.to_owned());
    }
    transaction.updated = OffsetDateTime::now_utc();

    Json(json!({ "message": "Transaction updated", "transaction": transaction })).into_response()
}

async fn delete_transaction(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.hit("DELETE /transactions/{id}");

    if let Some(rejection) = state.check_csrf(&headers) {
        return rejection;
    }

    let mut transactions = state.transactions.lock().unwrap();
    let count = transactions.len();
    transactions.retain(|transaction| transaction.id.as_str() != id);

    if transactions.len() == count {
        message(StatusCode::NOT_FOUND, "Transaction not found")
    } else {
        Json(json!({ "message": "Transaction deleted" })).into_response()
    }
}
