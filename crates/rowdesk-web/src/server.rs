// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use axum::Router;
use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use rowdesk_app::{
    ColumnName, Descriptor, GridView, SortDirection, TabCommand, TabEvent, TabState, TableName,
};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::render::{Renderer, TabLink};
use crate::runtime::TableRuntime;
use crate::tab::{EventRegistry, TableTab};
use crate::wiring::{TabInput, handle_event};

pub const SESSION_COOKIE: &str = "rowdesk_session";

pub type SharedRuntime = Arc<Mutex<dyn TableRuntime + Send>>;

/// Sessions idle longer than this are dropped on the next request.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const MAX_SESSIONS: usize = 256;

#[derive(Debug)]
pub enum WebError {
    NotFound(String),
    BadRequest(anyhow::Error),
    Internal(anyhow::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(message) => f.write_str(message),
            Self::BadRequest(error) | Self::Internal(error) => write!(f, "{error:#}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<anyhow::Error> for WebError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(error)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
            Self::BadRequest(error) => {
                (StatusCode::BAD_REQUEST, format!("{error:#}")).into_response()
            }
            Self::Internal(error) => {
                warn!(error = %format!("{error:#}"), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{error:#}")).into_response()
            }
        }
    }
}

struct Session {
    tabs: BTreeMap<TableName, TabState>,
    last_seen: Instant,
}

/// Per-browser tab states, bounded by idle time and count.
struct Sessions {
    entries: HashMap<Uuid, Session>,
    idle_timeout: Duration,
    capacity: usize,
}

impl Sessions {
    fn new(idle_timeout: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            idle_timeout,
            capacity: capacity.max(1),
        }
    }

    /// Drops idle sessions, evicts the least recently seen ones while at
    /// capacity, then returns `id`'s session marked as seen `now`.
    fn touch(&mut self, id: Uuid, now: Instant) -> &mut Session {
        let idle_timeout = self.idle_timeout;
        let before = self.entries.len();
        self.entries
            .retain(|_, session| now.saturating_duration_since(session.last_seen) < idle_timeout);
        if !self.entries.contains_key(&id) {
            while self.entries.len() >= self.capacity {
                let Some(oldest) = self
                    .entries
                    .iter()
                    .min_by_key(|(_, session)| session.last_seen)
                    .map(|(id, _)| *id)
                else {
                    break;
                };
                self.entries.remove(&oldest);
            }
        }
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(dropped, remaining = self.entries.len(), "pruned sessions");
        }

        let session = self.entries.entry(id).or_insert_with(|| Session {
            tabs: BTreeMap::new(),
            last_seen: now,
        });
        session.last_seen = now;
        session
    }
}

struct Shared {
    title: String,
    runtime: SharedRuntime,
    tabs: Vec<TableTab>,
    registry: EventRegistry,
    renderer: Renderer,
    sessions: Mutex<Sessions>,
}

/// Tabs, registry and runtime shared by every request, plus the per-session
/// tab states.
#[derive(Clone)]
pub struct AppState {
    shared: Arc<Shared>,
}

impl AppState {
    pub fn new(
        title: impl Into<String>,
        runtime: SharedRuntime,
        tabs: Vec<TableTab>,
        registry: EventRegistry,
    ) -> Result<Self> {
        if tabs.is_empty() {
            bail!("no tables to show -- add a [[tabs]] entry or point the config at a non-empty database");
        }
        Ok(Self {
            shared: Arc::new(Shared {
                title: title.into(),
                runtime,
                tabs,
                registry,
                renderer: Renderer::new()?,
                sessions: Mutex::new(Sessions::new(SESSION_IDLE_TIMEOUT, MAX_SESSIONS)),
            }),
        })
    }

    /// Replaces the session idle timeout and capacity. Call before sharing
    /// the state with the router.
    pub fn with_session_limits(self, idle_timeout: Duration, capacity: usize) -> Result<Self> {
        {
            let mut sessions = lock(&self.shared.sessions)?;
            sessions.idle_timeout = idle_timeout;
            sessions.capacity = capacity.max(1);
        }
        Ok(self)
    }

    pub fn session_count(&self) -> Result<usize> {
        Ok(lock(&self.shared.sessions)?.entries.len())
    }

    pub fn tabs(&self) -> &[TableTab] {
        &self.shared.tabs
    }

    pub fn first_href(&self) -> String {
        self.shared
            .tabs
            .first()
            .map(TableTab::href)
            .unwrap_or_else(|| "/".to_owned())
    }

    /// Applies any grid view carried by `query`, then renders the page.
    pub fn render_tab(
        &self,
        session: Uuid,
        table: &str,
        query: &[(String, String)],
    ) -> Result<String, WebError> {
        let tab = self.find_tab(table)?;
        let view = if query.is_empty() {
            None
        } else {
            Some(parse_view(tab.descriptor(), query).map_err(WebError::BadRequest)?)
        };

        let layout = {
            let mut sessions = lock(&self.shared.sessions)?;
            let mut runtime = lock(&self.shared.runtime)?;
            let state = session_tab(&mut sessions, session, tab, &mut *runtime)?;
            if let Some(view) = view {
                state.dispatch(TabCommand::SetView(view))?;
            }
            let options = tab.dropdown_options(&mut *runtime)?;
            tab.layout(state, &options)
        };

        let links = self
            .shared
            .tabs
            .iter()
            .map(|candidate| TabLink {
                table: candidate.table().to_string(),
                href: candidate.href(),
                active: candidate.table() == tab.table(),
            })
            .collect::<Vec<_>>();
        Ok(self
            .shared
            .renderer
            .render_page(&self.shared.title, &links, &layout)?)
    }

    /// Resolves the posted trigger and runs it against the session's tab.
    pub fn post_event(
        &self,
        session: Uuid,
        table: &str,
        fields: &[(String, String)],
    ) -> Result<Vec<TabEvent>, WebError> {
        let tab = self.find_tab(table)?;
        let trigger = fields
            .iter()
            .find(|(name, _)| name == "trigger")
            .map(|(_, value)| value.as_str())
            .ok_or_else(|| WebError::BadRequest(anyhow!("event is missing its trigger field")))?;
        let Some((owner, control)) = self.shared.registry.resolve(trigger) else {
            return Err(WebError::BadRequest(anyhow!("unknown control id `{trigger}`")));
        };
        if owner != tab.table() {
            return Err(WebError::BadRequest(anyhow!(
                "control `{trigger}` belongs to tab `{owner}`, not `{table}`"
            )));
        }
        let input = TabInput::from_fields(fields).map_err(WebError::BadRequest)?;

        let mut sessions = lock(&self.shared.sessions)?;
        let mut runtime = lock(&self.shared.runtime)?;
        let state = session_tab(&mut sessions, session, tab, &mut *runtime)?;
        let events = handle_event(tab, state, &mut *runtime, control, input)?;
        debug!(table = %tab.table(), trigger, events = events.len(), "event handled");
        Ok(events)
    }

    fn find_tab(&self, table: &str) -> Result<&TableTab, WebError> {
        self.shared
            .tabs
            .iter()
            .find(|tab| tab.table().as_str() == table)
            .ok_or_else(|| WebError::NotFound(format!("no tab for table `{table}`")))
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| anyhow!("shared state lock poisoned by an earlier panic"))
}

fn session_tab<'a>(
    sessions: &'a mut Sessions,
    id: Uuid,
    tab: &TableTab,
    runtime: &mut dyn TableRuntime,
) -> Result<&'a mut TabState> {
    let session = sessions.touch(id, Instant::now());
    match session.tabs.entry(tab.table().clone()) {
        Entry::Occupied(entry) => Ok(entry.into_mut()),
        Entry::Vacant(entry) => {
            let state = tab.initial_state(runtime)?;
            Ok(entry.insert(state))
        }
    }
}

/// Reads `sort`, `dir`, `filter.{col}` and `page`. Blank filters are dropped.
pub fn parse_view(descriptor: &Descriptor, query: &[(String, String)]) -> Result<GridView> {
    let known = |name: &str| -> Result<ColumnName> {
        if descriptor.column(name).is_none() {
            bail!("`{name}` is not a column of `{}`", descriptor.table());
        }
        ColumnName::parse(name)
    };

    let mut view = GridView::default();
    let mut sort = None;
    let mut direction = SortDirection::Asc;
    for (name, value) in query {
        match name.as_str() {
            "sort" if !value.is_empty() => sort = Some(known(value)?),
            "dir" => {
                direction = SortDirection::parse(value)
                    .with_context(|| format!("sort direction {value:?} must be asc or desc"))?;
            }
            "page" if !value.is_empty() => {
                view.page = value
                    .parse()
                    .with_context(|| format!("page {value:?} is not a page number"))?;
            }
            _ => {
                if let Some(column) = name.strip_prefix("filter.")
                    && !value.trim().is_empty()
                {
                    view.filters.insert(known(column)?, value.clone());
                }
            }
        }
    }
    view.sort = sort.map(|column| (column, direction));
    Ok(view)
}

/// Session id from the request cookie, or a fresh one plus its
/// `Set-Cookie` header.
pub fn session_from(headers: &HeaderMap) -> (Uuid, Option<HeaderValue>) {
    let existing = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            pair.trim()
                .strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
        })
        .find_map(|id| Uuid::parse_str(id).ok());
    if let Some(id) = existing {
        return (id, None);
    }

    let id = Uuid::new_v4();
    let cookie = HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax"
    ))
    .ok();
    (id, cookie)
}

fn with_cookie(mut response: Response, cookie: Option<HeaderValue>) -> Response {
    if let Some(cookie) = cookie {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/tabs/:table", get(show_tab))
        .route("/tabs/:table/events", post(post_event))
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Redirect {
    Redirect::to(&state.first_href())
}

async fn show_tab(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let (session, cookie) = session_from(&headers);
    let html = state.render_tab(session, &table, &query)?;
    Ok(with_cookie(Html(html).into_response(), cookie))
}

async fn post_event(
    State(state): State<AppState>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, WebError> {
    let (session, cookie) = session_from(&headers);
    state.post_event(session, &table, &fields)?;
    // Post/redirect/get: the browser re-reads the tab with a 303.
    let redirect = Redirect::to(&format!("/tabs/{table}"));
    Ok(with_cookie(redirect.into_response(), cookie))
}

pub async fn serve(state: AppState, bind: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind http listener on {bind}"))?;
    info!(address = %bind, tabs = state.tabs().len(), "serving");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("run http server")
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "listen for shutdown signal");
        return;
    }
    info!("shutting down");
}
