//! Authentication and role-based access control for the reference server
//! (SPEC_FULL.md §4.10). Not part of the embedded engine's correctness
//! contract; a host embedding `Engine` directly never touches this.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// User roles with hierarchical permissions over the engine's call
/// surface rather than over any particular query language construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Editor => write!(f, "editor"),
            Role::Viewer => write!(f, "viewer"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            "viewer" => Ok(Role::Viewer),
            _ => Err(format!("unknown role '{s}'. valid roles: admin, editor, viewer")),
        }
    }
}

/// Authenticated identity attached to a server connection.
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    pub username: String,
    pub role: Role,
}

/// A request classified by the kind of effect it has on the engine, for
/// the purpose of authorization — not the request's actual shape on the
/// wire (see `protocol::wire::Request` for that).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Observe,
    Insert,
    Update,
    Delete,
    CreateTable,
    DropTable,
    CreateDatabase,
    DropDatabase,
    ManageUsers,
}

/// Check whether a role may perform `op`. `Ok(())` if allowed.
pub fn authorize(role: Role, op: Operation) -> Result<(), String> {
    use Operation::*;
    match role {
        Role::Admin => Ok(()),
        Role::Editor => match op {
            Select | Observe | Insert | Update | Delete | CreateTable | DropTable => Ok(()),
            CreateDatabase | DropDatabase | ManageUsers => {
                Err(format!("permission denied: editors cannot perform {op:?}"))
            }
        },
        Role::Viewer => match op {
            Select | Observe => Ok(()),
            other => Err(format!("permission denied: viewers cannot perform {other:?}")),
        },
    }
}

// ── Password hashing (argon2id) ─────────────────────────────────────────

pub fn hash_password(password: &str) -> String {
    use argon2::{
        password_hash::{rand_core::OsRng, SaltString},
        Argon2, PasswordHasher,
    };
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .expect("argon2 hashing should not fail")
        .to_string()
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::{password_hash::PasswordHash, Argon2, PasswordVerifier};
    let parsed = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

// ── API key hashing (SHA-256) ────────────────────────────────────────────

pub fn hash_api_key(key: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn generate_api_key() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    use std::fmt::Write;
    let mut hex = String::with_capacity(64);
    for b in &bytes {
        let _ = write!(hex, "{b:02x}");
    }
    hex
}

// ── Credential persistence ───────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedCredentials {
    pub admin_password: String,
    pub api_key: String,
}

impl PersistedCredentials {
    pub fn load(path: &Path) -> Option<Self> {
        let contents = std::fs::read_to_string(path).ok()?;
        toml::from_str(&contents).ok()
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| std::io::Error::other(e.to_string()))?;
        std::fs::write(path, contents)
    }
}
