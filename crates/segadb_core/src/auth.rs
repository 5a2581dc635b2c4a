//! Users, roles, and sessions. Passwords are stored as bcrypt hashes;
//! sessions are opaque UUID tokens mapped back to usernames.

use crate::error::{DbError, DbResult};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// A single grantable capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Permission {
    /// Read records from tables.
    ReadTable,
    /// Insert, update, and delete records.
    WriteTable,
    /// Create new tables.
    CreateTable,
    /// Drop tables.
    DropTable,
    /// Create backups.
    Backup,
    /// Restore from backups.
    Restore,
    /// Register and remove users.
    ManageUsers,
}

/// A set of permissions, typically derived from roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything.
    #[must_use]
    pub fn admin() -> Self {
        Self(BTreeSet::from([
            Permission::ReadTable,
            Permission::WriteTable,
            Permission::CreateTable,
            Permission::DropTable,
            Permission::Backup,
            Permission::Restore,
            Permission::ManageUsers,
        ]))
    }

    /// Read and write records, but no schema or admin capabilities.
    #[must_use]
    pub fn editor() -> Self {
        Self(BTreeSet::from([
            Permission::ReadTable,
            Permission::WriteTable,
        ]))
    }

    /// Read-only access.
    #[must_use]
    pub fn read_only() -> Self {
        Self(BTreeSet::from([Permission::ReadTable]))
    }

    /// Whether the capability is granted.
    #[must_use]
    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    /// Merges another set into this one.
    pub fn extend(&mut self, other: &PermissionSet) {
        self.0.extend(other.0.iter().copied());
    }
}

/// Built-in roles mapping to permission sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Full control.
    Admin,
    /// Record-level read and write.
    Editor,
    /// Read-only.
    ReadOnly,
}

impl Role {
    /// The permissions this role grants.
    #[must_use]
    pub fn permissions(self) -> PermissionSet {
        match self {
            Self::Admin => PermissionSet::admin(),
            Self::Editor => PermissionSet::editor(),
            Self::ReadOnly => PermissionSet::read_only(),
        }
    }
}

/// Credential check yielding the caller's permissions.
pub trait Authenticator {
    /// Verifies a username and password, returning the granted
    /// permissions or `PermissionDenied`.
    fn authenticate(&self, username: &str, password: &str) -> DbResult<PermissionSet>;
}

#[derive(Debug, Clone)]
struct UserEntry {
    password_hash: String,
    roles: Vec<Role>,
}

/// In-memory user store with bcrypt password hashing and UUID sessions.
#[derive(Debug, Default)]
pub struct UserManager {
    users: HashMap<String, UserEntry>,
    sessions: HashMap<Uuid, String>,
}

impl UserManager {
    /// Creates an empty user store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user, hashing the password with bcrypt.
    pub fn register_user(
        &mut self,
        username: &str,
        password: &str,
        roles: Vec<Role>,
    ) -> DbResult<()> {
        if self.users.contains_key(username) {
            return Err(DbError::invalid_operation(format!(
                "user {username:?} already exists"
            )));
        }
        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| DbError::invalid_operation(format!("password hashing failed: {e}")))?;
        self.users.insert(
            username.to_string(),
            UserEntry {
                password_hash,
                roles,
            },
        );
        Ok(())
    }

    /// Removes a user and any sessions they hold.
    pub fn remove_user(&mut self, username: &str) -> DbResult<()> {
        if self.users.remove(username).is_none() {
            return Err(DbError::invalid_operation(format!(
                "user {username:?} does not exist"
            )));
        }
        self.sessions.retain(|_, owner| owner != username);
        Ok(())
    }

    /// Verifies credentials and opens a session, returning its token.
    pub fn login(&mut self, username: &str, password: &str) -> DbResult<Uuid> {
        self.authenticate(username, password)?;
        let token = Uuid::new_v4();
        self.sessions.insert(token, username.to_string());
        tracing::debug!(username, "session opened");
        Ok(token)
    }

    /// Closes a session. Unknown tokens are ignored.
    pub fn logout(&mut self, token: Uuid) {
        self.sessions.remove(&token);
    }

    /// The permissions granted to a live session.
    pub fn session_permissions(&self, token: Uuid) -> DbResult<PermissionSet> {
        let username = self
            .sessions
            .get(&token)
            .ok_or_else(|| DbError::permission_denied("no such session"))?;
        let entry = self
            .users
            .get(username)
            .ok_or_else(|| DbError::permission_denied("session user no longer exists"))?;
        Ok(combined_permissions(&entry.roles))
    }

    /// Number of open sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Authenticator for UserManager {
    fn authenticate(&self, username: &str, password: &str) -> DbResult<PermissionSet> {
        let entry = self
            .users
            .get(username)
            .ok_or_else(|| DbError::permission_denied("unknown user or bad password"))?;
        let ok = bcrypt::verify(password, &entry.password_hash)
            .map_err(|e| DbError::invalid_operation(format!("password check failed: {e}")))?;
        if !ok {
            return Err(DbError::permission_denied("unknown user or bad password"));
        }
        Ok(combined_permissions(&entry.roles))
    }
}

fn combined_permissions(roles: &[Role]) -> PermissionSet {
    let mut set = PermissionSet::new();
    for role in roles {
        set.extend(&role.permissions());
    }
    set
}
