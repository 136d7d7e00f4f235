//! Segment-tree request router.
//!
//! Every node of the tree is one path segment. Nodes without a method are
//! groups; nodes with one are leaves. A segment written `:name` is parametric
//! and matches any single path component.
//!
//! Each node carries a middleware chain. A group starts with a copy of its
//! parent's chain; a leaf's chain is its parent's chain followed by the
//! handlers registered for it. [`Router::middleware`] appends to the node it
//! is called on *and* to every descendant already registered below it, so
//! middleware added after a route still reaches that route (after its own
//! handlers).

use std::iter;
use std::sync::Arc;

use http::Method;
use tracing::{debug, error};

use crate::context::Context;
use crate::error::RouteError;
use crate::handler::HandlerRef;
use crate::request::Request;
use crate::response::Response;
use crate::settings::Settings;

/// Characters that may not appear in a path. `:` is allowed only as the first
/// character of a registered segment.
const RESERVED: &[char] = &['"', '\'', '%', '&', '(', ')', ';', '+', '[', ']', '{', '}', ':', '*', '<', '>', '='];

// ── Node ──────────────────────────────────────────────────────────────────────

struct Node {
    segment: String,
    method: Option<Method>,
    chain: Arc<[HandlerRef]>,
    children: Vec<Node>,
    path: String,
}

impl Node {
    fn root() -> Self {
        Self {
            segment: String::new(),
            method: None,
            chain: Arc::from(Vec::new()),
            children: Vec::new(),
            path: String::new(),
        }
    }

    fn child(&self, segment: &str, method: Option<Method>, chain: Arc<[HandlerRef]>) -> Self {
        Self {
            segment: segment.to_owned(),
            method,
            chain,
            children: Vec::new(),
            path: format!("{}/{segment}", self.path),
        }
    }

    fn param(&self) -> Option<&str> {
        self.segment.strip_prefix(':')
    }

    /// Whether a sibling registered as `segment` could never be reached past
    /// this node. Parametric siblings shadow each other whatever their names.
    fn shadows(&self, segment: &str) -> bool {
        self.segment == segment || (self.param().is_some() && segment.starts_with(':'))
    }

    /// The group reached by walking `segments`, creating missing groups on
    /// the way.
    fn group_mut(&mut self, segments: &[&str]) -> &mut Node {
        let Some((first, rest)) = segments.split_first() else {
            return self;
        };
        let found = self.children.iter().position(|c| c.method.is_none() && c.segment == *first);
        let index = match found {
            Some(index) => index,
            None => {
                let group = self.child(first, None, Arc::clone(&self.chain));
                self.children.push(group);
                self.children.len() - 1
            }
        };
        self.children[index].group_mut(rest)
    }

    fn append(&mut self, handler: &HandlerRef) {
        self.chain = self.chain.iter().cloned().chain(iter::once(handler.clone())).collect();
        for child in &mut self.children {
            child.append(handler);
        }
    }

    /// The child matching `segment`: a literal one if there is one, else a
    /// parametric one. `method` selects leaves (`Some`) or groups (`None`).
    fn find(&self, segment: &str, method: Option<&Method>) -> Option<&Node> {
        let mut param = None;
        for child in self.children.iter().filter(|c| c.method.as_ref() == method) {
            if child.segment == segment {
                return Some(child);
            }
            if param.is_none() && child.param().is_some() {
                param = Some(child);
            }
        }
        param
    }
}

// ── Route ─────────────────────────────────────────────────────────────────────

/// The result of resolving a request: the handler chain to run and the path
/// parameters bound on the way down.
#[derive(Clone, Debug)]
pub struct Route {
    chain: Arc<[HandlerRef]>,
    params: Vec<(String, String)>,
}

impl Route {
    pub fn chain(&self) -> &[HandlerRef] {
        &self.chain
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The application router.
///
/// Built once at startup, by value, and handed to
/// [`Server::serve`](crate::Server::serve). Registration methods return
/// `self` so calls chain; groups are configured in a closure:
///
/// ```rust
/// use kelp::{Context, HandlerRef, Router, middleware};
///
/// fn user(ctx: &mut Context) {
///     let id = ctx.param("id").unwrap_or_default().to_owned();
///     ctx.text(id);
/// }
///
/// let app = Router::new()
///     .middleware(middleware::recovery())
///     .get("/ping", HandlerRef::unit(|| {}))
///     .group("/v1", |v1| {
///         v1.middleware(middleware::token_auth("secret"))
///             .get("/users/:id", HandlerRef::context(user))
///     });
///
/// assert!(app.resolve(&kelp::Method::GET, "/v1/users/42").is_some());
/// ```
pub struct Router {
    node: Node,
    settings: Arc<Settings>,
}

impl Router {
    pub fn new() -> Self {
        Self { node: Node::root(), settings: Arc::default() }
    }

    /// Replaces the envelope settings shared by every request.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Appends `handler` to this node's chain and to the chain of every route
    /// and group already registered below it.
    pub fn middleware(mut self, handler: HandlerRef) -> Self {
        self.node.append(&handler);
        self
    }

    /// Configures the group at `path` (created if it does not exist yet).
    ///
    /// A new group starts with a copy of this node's chain.
    ///
    /// # Panics
    ///
    /// Panics if `path` is invalid. Use [`try_group`](Self::try_group) to
    /// handle the error instead.
    pub fn group(self, path: &str, f: impl FnOnce(Router) -> Router) -> Self {
        self.try_group(path, |group| Ok(f(group)))
            .unwrap_or_else(|e| panic!("invalid group `{path}`: {e}"))
    }

    pub fn try_group(
        mut self,
        path: &str,
        f: impl FnOnce(Router) -> Result<Router, RouteError>,
    ) -> Result<Self, RouteError> {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return f(self);
        }
        check_path(trimmed)?;
        let segments: Vec<&str> = trimmed[1..].split('/').collect();

        let settings = Arc::clone(&self.settings);
        let slot = self.node.group_mut(&segments);
        let detached = std::mem::replace(slot, Node::root());
        let group = f(Router { node: detached, settings })?;
        *slot = group.node;
        Ok(self)
    }

    /// Registers a chain of handlers for `method` and `path`.
    ///
    /// # Panics
    ///
    /// Panics if the path is invalid, the chain is empty, or the route is
    /// already registered. Use [`try_handle`](Self::try_handle) to handle the
    /// error instead.
    pub fn handle(
        self,
        method: Method,
        path: &str,
        handlers: impl IntoIterator<Item = HandlerRef>,
    ) -> Self {
        self.try_handle(method, path, handlers)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"))
    }

    pub fn try_handle(
        mut self,
        method: Method,
        path: &str,
        handlers: impl IntoIterator<Item = HandlerRef>,
    ) -> Result<Self, RouteError> {
        check_path(path)?;
        let handlers: Vec<HandlerRef> = handlers.into_iter().collect();
        if handlers.is_empty() {
            return Err(RouteError::NoHandler { method: method.to_string(), path: path.to_owned() });
        }

        let segments: Vec<&str> = path[1..].split('/').collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| RouteError::InvalidPath(path.to_owned()))?;
        let parent = self.node.group_mut(parents);

        let taken = parent
            .children
            .iter()
            .any(|c| c.method.as_ref() == Some(&method) && c.shadows(last));
        if taken {
            return Err(RouteError::Duplicate { method: method.to_string(), path: path.to_owned() });
        }

        let chain: Arc<[HandlerRef]> = parent.chain.iter().cloned().chain(handlers).collect();
        let leaf = parent.child(last, Some(method.clone()), chain);
        debug!(%method, path = %leaf.path, chain = leaf.chain.len(), "route registered");
        parent.children.push(leaf);
        Ok(self)
    }

    /// Registers a single handler for `method` and `path`.
    pub fn on(self, method: Method, path: &str, handler: HandlerRef) -> Self {
        self.handle(method, path, [handler])
    }

    pub fn get(self, path: &str, handler: HandlerRef) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: HandlerRef) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: HandlerRef) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: HandlerRef) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    pub fn patch(self, path: &str, handler: HandlerRef) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    /// Finds the route for `method` and `path`.
    ///
    /// Each segment prefers a literal child over a parametric one; there is no
    /// backtracking. Illegal paths never match.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<Route> {
        if !is_legal_request_path(path) {
            debug!(path, "illegal request path");
            return None;
        }
        let segments: Vec<&str> = path[1..].split('/').collect();
        let (last, parents) = segments.split_last()?;

        let mut params = Vec::new();
        let mut node = &self.node;
        for segment in parents {
            node = node.find(segment, None)?;
            if let Some(name) = node.param() {
                params.push((name.to_owned(), (*segment).to_owned()));
            }
        }
        let leaf = node.find(last, Some(method))?;
        if let Some(name) = leaf.param() {
            params.push((name.to_owned(), (*last).to_owned()));
        }

        Some(Route { chain: Arc::clone(&leaf.chain), params })
    }

    /// Runs `request` through its route's chain and returns the response.
    ///
    /// Unmatched requests get the configured not-found envelope.
    pub fn dispatch(&self, request: Request) -> Response {
        let Some(route) = self.resolve(request.method(), request.path()) else {
            debug!(method = %request.method(), path = request.path(), "no route");
            return match serde_json::to_vec(&self.settings.not_found) {
                Ok(body) => Response::json(body),
                Err(err) => {
                    error!("not-found envelope serialization failed: {err}");
                    Response::status(http::StatusCode::INTERNAL_SERVER_ERROR)
                }
            };
        };

        let mut ctx = Context::new(request, route.params, route.chain, Arc::clone(&self.settings));
        ctx.start();
        ctx.into_response()
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

// ── Path rules ────────────────────────────────────────────────────────────────

fn check_path(path: &str) -> Result<(), RouteError> {
    if !path.starts_with('/') || path.contains("//") {
        return Err(RouteError::InvalidPath(path.to_owned()));
    }
    for segment in path[1..].split('/') {
        let name = segment.strip_prefix(':');
        if name == Some("") {
            return Err(RouteError::EmptyParam(path.to_owned()));
        }
        if let Some(ch) = name.unwrap_or(segment).chars().find(|c| RESERVED.contains(c)) {
            return Err(RouteError::ReservedChar { path: path.to_owned(), ch });
        }
    }
    Ok(())
}

fn is_legal_request_path(path: &str) -> bool {
    path.starts_with('/') && !path.contains("//") && !path.contains(RESERVED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Shape;

    fn noop() -> HandlerRef {
        HandlerRef::unit(|| {})
    }

    fn chain_len(router: &Router, path: &str) -> usize {
        router.resolve(&Method::GET, path).map(|r| r.chain().len()).unwrap_or(0)
    }

    #[test]
    fn group_chains_are_copied_at_creation() {
        let router = Router::new()
            .group("/0", |r| r.handle(Method::GET, "/1", [noop()]).handle(Method::GET, "/2", [noop(), noop()]))
            .group("/1", |r| {
                r.middleware(noop()).handle(Method::GET, "/1", [noop()]).handle(Method::GET, "/2", [noop(), noop()])
            });

        assert_eq!(chain_len(&router, "/1/1"), 2);
        assert_eq!(chain_len(&router, "/1/2"), 3);
        assert_eq!(chain_len(&router, "/0/1"), 1);
        assert_eq!(chain_len(&router, "/0/2"), 2);
    }

    #[test]
    fn middleware_reaches_registered_descendants() {
        let router = Router::new()
            .group("/api", |api| api.get("/a", noop()))
            .get("/b", noop())
            .middleware(noop())
            .group("/api", |api| api.get("/c", noop()));

        // Appended after the handler of routes that already existed.
        assert_eq!(chain_len(&router, "/api/a"), 2);
        assert_eq!(chain_len(&router, "/b"), 2);
        // The reused group received it as well.
        assert_eq!(chain_len(&router, "/api/c"), 2);
    }

    #[test]
    fn middleware_order_is_preserved() {
        let first = noop();
        let second = HandlerRef::context(|ctx: &mut Context| ctx.next());
        let router = Router::new()
            .middleware(first)
            .middleware(second)
            .get("/x", HandlerRef::output(|_: &mut ()| {}));

        let route = router.resolve(&Method::GET, "/x").unwrap();
        let shapes: Vec<_> = route.chain().iter().map(HandlerRef::shape).collect();
        assert_eq!(shapes, [Shape::Unit, Shape::Context, Shape::Output]);
    }

    #[test]
    fn params_bind_in_descent_order() {
        let router = Router::new().get("/a/:x/b/:y", noop()).get("/a/:x/c", noop());

        let route = router.resolve(&Method::GET, "/a/42/b/7").unwrap();
        assert_eq!(route.params(), [("x".to_owned(), "42".to_owned()), ("y".to_owned(), "7".to_owned())]);

        let route = router.resolve(&Method::GET, "/a/hello/c").unwrap();
        assert_eq!(route.params(), [("x".to_owned(), "hello".to_owned())]);
    }

    #[test]
    fn literal_beats_param_without_backtracking() {
        let router = Router::new()
            .get("/users/me", noop())
            .get("/users/:id", noop())
            .get("/files/raw/list", noop())
            .get("/files/:dir/info", noop());

        assert!(router.resolve(&Method::GET, "/users/me").unwrap().params().is_empty());
        assert_eq!(router.resolve(&Method::GET, "/users/9").unwrap().params().len(), 1);
        // `raw` takes the literal branch, which has no `info`.
        assert!(router.resolve(&Method::GET, "/files/raw/info").is_none());
        assert!(router.resolve(&Method::GET, "/files/etc/info").is_some());
    }

    #[test]
    fn method_must_match() {
        let router = Router::new().post("/echo", noop()).put("/echo", noop());
        assert!(router.resolve(&Method::POST, "/echo").is_some());
        assert!(router.resolve(&Method::PUT, "/echo").is_some());
        assert!(router.resolve(&Method::GET, "/echo").is_none());
    }

    #[test]
    fn root_and_trailing_slash_are_distinct() {
        let router = Router::new().get("/", noop()).get("/a/", noop());
        assert!(router.resolve(&Method::GET, "/").is_some());
        assert!(router.resolve(&Method::GET, "/a/").is_some());
        assert!(router.resolve(&Method::GET, "/a").is_none());
    }

    #[test]
    fn invalid_registrations_fail() {
        let err = |path: &str| Router::new().try_handle(Method::GET, path, [noop()]).err().unwrap();

        assert_eq!(err("a"), RouteError::InvalidPath("a".to_owned()));
        assert_eq!(err(""), RouteError::InvalidPath(String::new()));
        assert_eq!(err("/a//b"), RouteError::InvalidPath("/a//b".to_owned()));
        assert_eq!(err("/a/:"), RouteError::EmptyParam("/a/:".to_owned()));
        assert_eq!(err("/a/b:c"), RouteError::ReservedChar { path: "/a/b:c".to_owned(), ch: ':' });
        assert_eq!(err("/a/{id}"), RouteError::ReservedChar { path: "/a/{id}".to_owned(), ch: '{' });

        let empty = Router::new().try_handle(Method::GET, "/a", []).err().unwrap();
        assert!(matches!(empty, RouteError::NoHandler { .. }));

        let dup = Router::new().get("/a", noop()).try_handle(Method::GET, "/a", [noop()]).err().unwrap();
        assert!(matches!(dup, RouteError::Duplicate { .. }));
    }

    #[test]
    fn sibling_params_with_one_method_are_duplicates() {
        let router = Router::new().get("/users/:id", noop());
        let dup = router.try_handle(Method::GET, "/users/:name", [noop()]).err().unwrap();
        assert_eq!(
            dup,
            RouteError::Duplicate { method: "GET".to_owned(), path: "/users/:name".to_owned() }
        );

        let router = Router::new()
            .get("/users/:id", noop())
            .post("/users/:name", noop())
            .get("/users/me", noop());
        let route = router.resolve(&Method::POST, "/users/7").unwrap();
        assert_eq!(route.params(), &[("name".to_owned(), "7".to_owned())]);
    }

    #[test]
    #[should_panic(expected = "invalid route `//`")]
    fn handle_panics_on_invalid_path() {
        let _ = Router::new().get("//", noop());
    }

    #[test]
    fn illegal_request_paths_never_match() {
        let router = Router::new().get("/a/:x", noop());
        for path in ["", "a", "//a", "/a//", "/a/%20", "/a/b=c", "/a/:x"] {
            assert!(router.resolve(&Method::GET, path).is_none(), "{path}");
        }
    }

    #[test]
    fn nested_group_paths() {
        let router = Router::new()
            .group("/v1/admin/", |admin| admin.get("/users", noop()))
            .group("/", |root| root.get("/top", noop()));
        assert!(router.resolve(&Method::GET, "/v1/admin/users").is_some());
        assert!(router.resolve(&Method::GET, "/top").is_some());
        assert!(Router::new().try_group("v1", Ok).is_err());
    }
}
