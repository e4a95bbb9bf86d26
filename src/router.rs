use std::collections::HashMap;
use std::sync::OnceLock;

use axum::http::Method;
use regex::Regex;

use crate::models::leading_int;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ListContacts,
    GetContact,
    CreateContact,
    UpdateContact,
    DeleteContact,
    AddPhone,
    DeletePhone,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(HashMap<String, String>);

impl PathParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Integer prefix of a captured segment; missing or non-numeric is 0,
    /// which never names a stored row.
    pub fn id(&self, key: &str) -> i64 {
        self.get(key).map_or(0, leading_int)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub endpoint: Endpoint,
    pub params: PathParams,
}

#[derive(Debug)]
struct Route {
    method: Method,
    regex: Regex,
    keys: Vec<String>,
    endpoint: Endpoint,
}

#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern compiles")
    })
}

fn compile_pattern(pattern: &str) -> Result<(Regex, Vec<String>), regex::Error> {
    let mut keys = Vec::new();
    let mut source = String::from("^");
    let mut last = 0;
    for caps in placeholder_regex().captures_iter(pattern) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        source.push_str(&regex::escape(&pattern[last..whole.start]));
        source.push_str(r"([\w-]+)");
        keys.push(caps[1].to_string());
        last = whole.end;
    }
    source.push_str(&regex::escape(&pattern[last..]));
    source.push('$');
    Ok((Regex::new(&source)?, keys))
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        method: Method,
        pattern: &str,
        endpoint: Endpoint,
    ) -> Result<(), regex::Error> {
        let (regex, keys) = compile_pattern(pattern)?;
        self.routes.push(Route {
            method,
            regex,
            keys,
            endpoint,
        });
        Ok(())
    }

    pub fn dispatch(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                let caps = route.regex.captures(path)?;
                let params = route
                    .keys
                    .iter()
                    .enumerate()
                    .filter_map(|(i, key)| {
                        Some((key.clone(), caps.get(i + 1)?.as_str().to_string()))
                    })
                    .collect();
                Some(RouteMatch {
                    endpoint: route.endpoint,
                    params: PathParams(params),
                })
            })
    }
}

pub fn api_routes() -> Result<RouteTable, regex::Error> {
    let mut table = RouteTable::new();
    table.add(Method::GET, "/api/contacts", Endpoint::ListContacts)?;
    table.add(Method::GET, "/api/contacts/{id}", Endpoint::GetContact)?;
    table.add(Method::POST, "/api/contacts", Endpoint::CreateContact)?;
    table.add(Method::PUT, "/api/contacts/{id}", Endpoint::UpdateContact)?;
    table.add(Method::DELETE, "/api/contacts/{id}", Endpoint::DeleteContact)?;
    table.add(Method::POST, "/api/contacts/{id}/phones", Endpoint::AddPhone)?;
    table.add(Method::DELETE, "/api/contacts/{id}/phones/{phoneId}", Endpoint::DeletePhone)?;
    Ok(table)
}
