//! Typed global node identifiers.
//!
//! Every node in the graph is addressable by an opaque [`Ident`]: the URL-safe base64 encoding of
//! `kind:part[:part...]`, where each part is percent-encoded so that it may itself contain `:`.

use std::{fmt, str::FromStr};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentKind {
    Team,
    User,
    App,
    Job,
    Deployment,
}

impl IdentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentKind::Team => "team",
            IdentKind::User => "user",
            IdentKind::App => "app",
            IdentKind::Job => "job",
            IdentKind::Deployment => "deployment",
        }
    }

    /// Number of parts an identifier of this kind carries.
    fn arity(&self) -> usize {
        match self {
            IdentKind::Team | IdentKind::User => 1,
            IdentKind::Deployment => 2,
            IdentKind::App | IdentKind::Job => 3,
        }
    }
}

impl fmt::Display for IdentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "team" => Ok(IdentKind::Team),
            "user" => Ok(IdentKind::User),
            "app" => Ok(IdentKind::App),
            "job" => Ok(IdentKind::Job),
            "deployment" => Ok(IdentKind::Deployment),
            other => Err(Error::invalid_argument(format!("unknown node kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub kind: IdentKind,
    pub parts: Vec<String>,
}

impl Ident {
    pub fn team(slug: &str) -> Self {
        Self::new(IdentKind::Team, [slug])
    }

    pub fn user(email: &str) -> Self {
        Self::new(IdentKind::User, [email])
    }

    pub fn app(env: &str, team: &str, name: &str) -> Self {
        Self::new(IdentKind::App, [env, team, name])
    }

    pub fn job(env: &str, team: &str, name: &str) -> Self {
        Self::new(IdentKind::Job, [env, team, name])
    }

    pub fn deployment(team: &str, id: &str) -> Self {
        Self::new(IdentKind::Deployment, [team, id])
    }

    fn new<'a>(kind: IdentKind, parts: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            kind,
            parts: parts.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn encode(&self) -> String {
        let mut payload = self.kind.as_str().to_string();
        for part in &self.parts {
            payload.push(':');
            payload.push_str(&urlencoding::encode(part));
        }
        URL_SAFE_NO_PAD.encode(payload)
    }

    pub fn parse(token: &str) -> Result<Self> {
        let invalid = || Error::invalid_argument("invalid node id");

        let bytes = URL_SAFE_NO_PAD.decode(token.trim_end_matches('=')).map_err(|_| invalid())?;
        let payload = String::from_utf8(bytes).map_err(|_| invalid())?;

        let mut segments = payload.split(':');
        let kind: IdentKind = segments.next().ok_or_else(invalid)?.parse()?;
        let parts = segments
            .map(|segment| urlencoding::decode(segment).map(|s| s.into_owned()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        if parts.len() != kind.arity() {
            return Err(invalid());
        }
        Ok(Self { kind, parts })
    }

    /// Part at `index`. Parsed identifiers always carry `kind`'s arity.
    pub fn part(&self, index: usize) -> &str {
        self.parts.get(index).map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
