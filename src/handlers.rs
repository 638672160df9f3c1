use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    extract::{Path, Query, State},
    http::{header::HeaderName, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::{
    error::{BookError, BookResult},
    models::{
        Contact, ContactId, ContactInput, EventDetail, EventId, EventInput, GroupDetail, GroupId,
        GroupInput, HealthResponse,
    },
    persistence::{self, DataStore},
    session::{EventSession, SessionView},
    store::Store,
};

/// Set to `failed` when a mutation succeeded but could not be saved.
pub const SAVE_STATUS_HEADER: &str = "x-save-status";

pub struct AppState {
    pub store: Arc<Mutex<Store>>,
    pub backend: Arc<dyn DataStore>,
    pub sessions: Arc<Mutex<HashMap<EventId, EventSession>>>,
}

impl AppState {
    pub fn new(store: Store, backend: Arc<dyn DataStore>) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            backend,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    // CORS: allow all
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        // Contacts
        .route("/api/contacts", get(list_contacts).post(create_contact))
        .route(
            "/api/contacts/:id",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
        // Events
        .route("/api/events", get(list_events).post(create_event))
        .route("/api/events/:id", get(get_event).delete(delete_event))
        .route(
            "/api/events/:id/participants/:contact_id",
            post(add_participant).delete(remove_participant),
        )
        // Manage-event sessions
        .route(
            "/api/events/:id/session",
            post(open_session).get(get_session).delete(close_session),
        )
        .route(
            "/api/events/:id/session/pending/:contact_id",
            post(select_pending).delete(remove_from_session),
        )
        .route(
            "/api/events/:id/session/confirm/:contact_id",
            post(confirm_pending),
        )
        // Groups
        .route("/api/groups", get(list_groups).post(create_group))
        .route(
            "/api/groups/:id",
            get(get_group).put(update_group).delete(delete_group),
        )
        .route(
            "/api/groups/:id/members/:contact_id",
            put(include_member).delete(exclude_member),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn internal_error(msg: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    error!("{}", msg);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": msg.to_string()})),
    )
}

fn not_found(msg: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"error": msg})))
}

fn bad_request(msg: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({"error": msg})))
}

fn error_response(err: BookError) -> Response {
    match err {
        BookError::Validation(msg) => bad_request(&msg).into_response(),
        BookError::NotFound(msg) => not_found(&msg).into_response(),
        err => internal_error(err).into_response(),
    }
}

fn no_session(event: EventId) -> BookError {
    BookError::NotFound(format!("no open session for event {event}"))
}

// ────────────────────────────────────────────────────────────────────────────
// Request logging (nginx-style)
// ────────────────────────────────────────────────────────────────────────────

fn log_request(method: &Method, uri: &Uri, headers: &HeaderMap, status: StatusCode) {
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    let referer = headers
        .get("referer")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info!(
        "{} {} {} {} \"{}\" \"{}\"",
        method.as_str(),
        uri.path(),
        uri.query().unwrap_or(""),
        status.as_u16(),
        user_agent,
        referer
    );
}

// ────────────────────────────────────────────────────────────────────────────
// Mutation helpers
// ────────────────────────────────────────────────────────────────────────────

struct Saved<T> {
    value: T,
    persisted: bool,
}

/// Runs `op` on a blocking thread and saves a full snapshot while the store
/// lock is still held, so saves land in mutation order. A failed save does
/// not undo the mutation.
async fn mutate<T, F>(state: &Arc<AppState>, op: F) -> Result<Saved<T>, Response>
where
    T: Send + 'static,
    F: FnOnce(&mut Store) -> BookResult<T> + Send + 'static,
{
    let store = state.store.clone();
    let backend = state.backend.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut guard = lock(&store);
        let value = op(&mut *guard)?;
        let persisted = persistence::save_store(backend.as_ref(), &*guard).is_ok();
        Ok::<_, BookError>(Saved { value, persisted })
    })
    .await;

    match result {
        Ok(Ok(saved)) => Ok(saved),
        Ok(Err(e)) => Err(error_response(e)),
        Err(e) => Err(internal_error(e).into_response()),
    }
}

fn saved_response<T: Serialize>(status: StatusCode, saved: Saved<T>) -> Response {
    let mut response = if status == StatusCode::NO_CONTENT {
        status.into_response()
    } else {
        (status, Json(json!(saved.value))).into_response()
    };
    if !saved.persisted {
        response.headers_mut().insert(
            HeaderName::from_static(SAVE_STATUS_HEADER),
            HeaderValue::from_static("failed"),
        );
    }
    response
}

fn respond<T: Serialize>(status: StatusCode, result: Result<Saved<T>, Response>) -> Response {
    match result {
        Ok(saved) => saved_response(status, saved),
        Err(response) => response,
    }
}

fn contact_of(store: &Store, id: ContactId) -> BookResult<Contact> {
    store
        .contact(id)
        .cloned()
        .ok_or_else(|| BookError::NotFound(format!("contact {id}")))
}

fn event_detail(store: &Store, id: EventId) -> BookResult<EventDetail> {
    let event = store
        .event(id)
        .cloned()
        .ok_or_else(|| BookError::NotFound(format!("event {id}")))?;
    let participant_contacts = store.event_participants(id)?.into_iter().cloned().collect();
    Ok(EventDetail {
        event,
        participant_contacts,
    })
}

fn group_detail(store: &Store, id: GroupId) -> BookResult<GroupDetail> {
    let group = store
        .group(id)
        .cloned()
        .ok_or_else(|| BookError::NotFound(format!("group {id}")))?;
    let member_contacts = store.group_members(id)?.into_iter().cloned().collect();
    Ok(GroupDetail {
        group,
        member_contacts,
    })
}

fn read<T: Serialize>(state: &AppState, op: impl FnOnce(&Store) -> BookResult<T>) -> Response {
    let store = lock(&state.store);
    match op(&*store) {
        Ok(value) => (StatusCode::OK, Json(json!(value))).into_response(),
        Err(e) => error_response(e),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok".to_string(),
        storage: state.backend.describe(),
    };
    (StatusCode::OK, Json(json!(resp)))
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let q = params.q.unwrap_or_default();
    read(&state, |store| {
        Ok(store
            .search_contacts(&q)
            .into_iter()
            .cloned()
            .collect::<Vec<_>>())
    })
}

pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ContactId>,
) -> impl IntoResponse {
    read(&state, |store| contact_of(store, id))
}

pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ContactInput>,
) -> impl IntoResponse {
    let result = mutate(&state, move |store| {
        let id = store.add_contact(input)?;
        contact_of(store, id)
    })
    .await;
    respond(StatusCode::CREATED, result)
}

pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ContactId>,
    Json(input): Json<ContactInput>,
) -> impl IntoResponse {
    let result = mutate(&state, move |store| {
        store.update_contact(id, input)?;
        contact_of(store, id)
    })
    .await;
    respond(StatusCode::OK, result)
}

pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ContactId>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> impl IntoResponse {
    let result = mutate(&state, move |store| store.delete_contact(id).map(|_| ())).await;
    let response = respond(StatusCode::NO_CONTENT, result);
    log_request(&method, &uri, &headers, response.status());
    response
}

pub async fn list_events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    read(&state, |store| Ok(store.events().to_vec()))
}

pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EventId>,
) -> impl IntoResponse {
    read(&state, |store| event_detail(store, id))
}

pub async fn create_event(
    State(state): State<Arc<AppState>>,
    Json(input): Json<EventInput>,
) -> impl IntoResponse {
    let result = mutate(&state, move |store| {
        let id = store.add_event(input)?;
        event_detail(store, id)
    })
    .await;
    respond(StatusCode::CREATED, result)
}

pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EventId>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> impl IntoResponse {
    let result = mutate(&state, move |store| store.delete_event(id).map(|_| ())).await;
    if result.is_ok() {
        lock(&state.sessions).remove(&id);
    }
    let response = respond(StatusCode::NO_CONTENT, result);
    log_request(&method, &uri, &headers, response.status());
    response
}

pub async fn add_participant(
    State(state): State<Arc<AppState>>,
    Path((id, contact)): Path<(EventId, ContactId)>,
) -> impl IntoResponse {
    let result = mutate(&state, move |store| {
        store.add_participant(id, contact)?;
        event_detail(store, id)
    })
    .await;
    respond(StatusCode::OK, result)
}

pub async fn remove_participant(
    State(state): State<Arc<AppState>>,
    Path((id, contact)): Path<(EventId, ContactId)>,
) -> impl IntoResponse {
    let result = mutate(&state, move |store| {
        store.remove_participant(id, contact)?;
        event_detail(store, id)
    })
    .await;
    respond(StatusCode::OK, result)
}

pub async fn list_groups(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    read(&state, |store| Ok(store.groups().to_vec()))
}

pub async fn get_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GroupId>,
) -> impl IntoResponse {
    read(&state, |store| group_detail(store, id))
}

pub async fn create_group(
    State(state): State<Arc<AppState>>,
    Json(input): Json<GroupInput>,
) -> impl IntoResponse {
    let result = mutate(&state, move |store| {
        let id = store.add_group(input)?;
        group_detail(store, id)
    })
    .await;
    respond(StatusCode::CREATED, result)
}

pub async fn update_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GroupId>,
    Json(input): Json<GroupInput>,
) -> impl IntoResponse {
    let result = mutate(&state, move |store| {
        store.update_group(id, input)?;
        group_detail(store, id)
    })
    .await;
    respond(StatusCode::OK, result)
}

pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GroupId>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> impl IntoResponse {
    let result = mutate(&state, move |store| store.delete_group(id).map(|_| ())).await;
    let response = respond(StatusCode::NO_CONTENT, result);
    log_request(&method, &uri, &headers, response.status());
    response
}

pub async fn include_member(
    State(state): State<Arc<AppState>>,
    Path((id, contact)): Path<(GroupId, ContactId)>,
) -> impl IntoResponse {
    set_membership(state, id, contact, true).await
}

pub async fn exclude_member(
    State(state): State<Arc<AppState>>,
    Path((id, contact)): Path<(GroupId, ContactId)>,
) -> impl IntoResponse {
    set_membership(state, id, contact, false).await
}

async fn set_membership(
    state: Arc<AppState>,
    id: GroupId,
    contact: ContactId,
    included: bool,
) -> Response {
    let result = mutate(&state, move |store| {
        store.set_group_membership(id, contact, included)?;
        group_detail(store, id)
    })
    .await;
    respond(StatusCode::OK, result)
}

// ────────────────────────────────────────────────────────────────────────────
// Manage-event sessions
// ────────────────────────────────────────────────────────────────────────────

pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EventId>,
) -> impl IntoResponse {
    let store = lock(&state.store);
    let opened = EventSession::open(&store, id).and_then(|mut session| {
        let view = session.view(&store)?;
        lock(&state.sessions).insert(id, session);
        Ok(view)
    });
    match opened {
        Ok(view) => (StatusCode::CREATED, Json(json!(view))).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EventId>,
) -> impl IntoResponse {
    let store = lock(&state.store);
    let mut sessions = lock(&state.sessions);
    let view = sessions
        .get_mut(&id)
        .ok_or_else(|| no_session(id))
        .and_then(|session| session.view(&store));
    match view {
        Ok(view) => (StatusCode::OK, Json(json!(view))).into_response(),
        Err(e) => error_response(e),
    }
}

/// Discards the session and every pending selection in it.
pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EventId>,
) -> impl IntoResponse {
    match lock(&state.sessions).remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => error_response(no_session(id)),
    }
}

pub async fn select_pending(
    State(state): State<Arc<AppState>>,
    Path((id, contact)): Path<(EventId, ContactId)>,
) -> impl IntoResponse {
    let store = lock(&state.store);
    let mut sessions = lock(&state.sessions);
    let view = sessions
        .get_mut(&id)
        .ok_or_else(|| no_session(id))
        .and_then(|session| {
            session.select(&store, contact)?;
            session.view(&store)
        });
    match view {
        Ok(view) => (StatusCode::OK, Json(json!(view))).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn confirm_pending(
    State(state): State<Arc<AppState>>,
    Path((id, contact)): Path<(EventId, ContactId)>,
) -> impl IntoResponse {
    session_mutation(state, id, move |session, store| {
        session.confirm(store, contact).map(|_| ())
    })
    .await
}

pub async fn remove_from_session(
    State(state): State<Arc<AppState>>,
    Path((id, contact)): Path<(EventId, ContactId)>,
) -> impl IntoResponse {
    session_mutation(state, id, move |session, store| {
        session.remove(store, contact).map(|_| ())
    })
    .await
}

async fn session_mutation<F>(state: Arc<AppState>, id: EventId, op: F) -> Response
where
    F: FnOnce(&mut EventSession, &mut Store) -> BookResult<()> + Send + 'static,
{
    let sessions = state.sessions.clone();
    let result = mutate(&state, move |store| -> BookResult<SessionView> {
        let mut sessions = lock(&sessions);
        let session = sessions.get_mut(&id).ok_or_else(|| no_session(id))?;
        op(session, store)?;
        session.view(store)
    })
    .await;
    respond(StatusCode::OK, result)
}
