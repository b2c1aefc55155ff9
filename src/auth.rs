//! Local email/password authentication with bcrypt.
//!
//! Users live in the SQLite `users` table; sessions are kept in-memory
//! with inactivity and max-duration expiry, plus a lockout counter that
//! persists in `local_settings` so restarting the app does not clear it.
//!
//! Role comes from the user row and is carried on the session. Every
//! privileged operation checks the session role explicitly; there is no
//! fallback chain that infers admin from an email pattern or a missing
//! profile document.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAX_FAILED_ATTEMPTS: u32 = 5;
const LOCKOUT_MINUTES: i64 = 15;
const SESSION_INACTIVITY_MINUTES: i64 = 60;
const SESSION_MAX_DURATION_HOURS: i64 = 12;
const LOCKOUT_ATTEMPTS_KEY: &str = "lockout_attempts";
const LOCKOUT_LAST_ATTEMPT_KEY: &str = "lockout_last_attempt";

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

const SYSTEM_INITIALIZED_KEY: &str = "system_initialized";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A stored user account.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
}

impl User {
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "email": self.email,
            "name": self.name,
            "role": self.role,
        })
    }
}

/// An active session.
#[derive(Clone)]
struct UserSession {
    session_id: String,
    user: User,
    login_time: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl UserSession {
    fn is_expired(&self) -> bool {
        let now = Utc::now();
        if now >= self.expires_at {
            return true;
        }
        if now - self.last_activity > Duration::minutes(SESSION_INACTIVITY_MINUTES) {
            return true;
        }
        false
    }

    /// JSON shape the frontend auth context consumes.
    fn to_user_json(&self) -> Value {
        serde_json::json!({
            "userId": self.user.id,
            "email": self.user.email,
            "name": self.user.name,
            "role": self.user.role,
            "sessionId": self.session_id,
            "loginTime": self.login_time.to_rfc3339(),
        })
    }
}

/// The caller identity a command sees: just who and what role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub role: String,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Lockout tracking entry.
struct LockoutEntry {
    attempts: u32,
    last_attempt: DateTime<Utc>,
}

/// Tauri managed state for authentication.
pub struct AuthState {
    sessions: Mutex<HashMap<String, UserSession>>,
    current_session_id: Mutex<Option<String>>,
    lockout: Mutex<LockoutEntry>,
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            current_session_id: Mutex::new(None),
            lockout: Mutex::new(LockoutEntry {
                attempts: 0,
                last_attempt: Utc::now(),
            }),
        }
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Lockout helpers
// ---------------------------------------------------------------------------

fn check_lockout(lockout: &LockoutEntry) -> Result<(), String> {
    if lockout.attempts >= MAX_FAILED_ATTEMPTS {
        let elapsed = Utc::now() - lockout.last_attempt;
        if elapsed < Duration::minutes(LOCKOUT_MINUTES) {
            let remaining = LOCKOUT_MINUTES - elapsed.num_minutes();
            return Err(format!(
                "Muitas tentativas. Tente novamente em {remaining} minuto(s)."
            ));
        }
    }
    Ok(())
}

fn record_failure(lockout: &mut LockoutEntry) {
    lockout.attempts += 1;
    lockout.last_attempt = Utc::now();
    warn!(attempts = lockout.attempts, "failed login attempt");
}

fn reset_lockout(lockout: &mut LockoutEntry) {
    lockout.attempts = 0;
    lockout.last_attempt = Utc::now();
}

fn load_lockout_from_db(conn: &Connection) -> LockoutEntry {
    let attempts = db::get_setting(conn, "auth", LOCKOUT_ATTEMPTS_KEY)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    let last_attempt = db::get_setting(conn, "auth", LOCKOUT_LAST_ATTEMPT_KEY)
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    LockoutEntry {
        attempts,
        last_attempt,
    }
}

fn persist_lockout_to_db(conn: &Connection, lockout: &LockoutEntry) {
    let _ = db::set_setting(
        conn,
        "auth",
        LOCKOUT_ATTEMPTS_KEY,
        &lockout.attempts.to_string(),
    );
    let _ = db::set_setting(
        conn,
        "auth",
        LOCKOUT_LAST_ATTEMPT_KEY,
        &lockout.last_attempt.to_rfc3339(),
    );
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

fn decode_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: row.get(3)?,
    })
}

fn find_user_by_email(conn: &Connection, email: &str) -> Option<(User, String)> {
    conn.query_row(
        "SELECT id, email, name, role, password_hash FROM users WHERE email = ?1",
        params![email],
        |row| Ok((decode_user(row)?, row.get::<_, String>(4)?)),
    )
    .ok()
}

/// Insert a user. Role must be "admin" or "user".
pub fn create_user(
    conn: &Connection,
    email: &str,
    name: &str,
    role: &str,
    password: &str,
) -> Result<User, String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err("Email inválido".into());
    }
    if password.len() < 6 {
        return Err("A senha deve ter pelo menos 6 caracteres".into());
    }
    if role != ROLE_ADMIN && role != ROLE_USER {
        return Err(format!("Perfil desconhecido: {role}"));
    }

    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| format!("Failed to hash password: {e}"))?;

    let user = User {
        id: format!("user-{}", Uuid::new_v4()),
        email,
        name: name.trim().to_string(),
        role: role.to_string(),
    };

    conn.execute(
        "INSERT INTO users (id, email, name, role, password_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.id,
            user.email,
            user.name,
            user.role,
            hash,
            Utc::now().to_rfc3339()
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            "Email já cadastrado".to_string()
        }
        other => format!("create user: {other}"),
    })?;

    info!(user_id = %user.id, role = %user.role, "user created");
    Ok(user)
}

/// All users, oldest first.
pub fn list_users(conn: &Connection) -> Result<Vec<User>, String> {
    let mut stmt = conn
        .prepare("SELECT id, email, name, role FROM users ORDER BY created_at ASC")
        .map_err(|e| e.to_string())?;
    let users = stmt
        .query_map([], decode_user)
        .map_err(|e| e.to_string())?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| e.to_string())?;
    Ok(users)
}

/// Delete a user. The last remaining admin cannot be deleted, otherwise
/// nobody could manage the system anymore.
pub fn delete_user(conn: &Connection, user_id: &str) -> Result<(), String> {
    let role: Option<String> = conn
        .query_row(
            "SELECT role FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .ok();
    let role = role.ok_or_else(|| format!("Usuário não encontrado: {user_id}"))?;

    if role == ROLE_ADMIN {
        let admins: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE role = ?1",
                params![ROLE_ADMIN],
                |row| row.get(0),
            )
            .map_err(|e| e.to_string())?;
        if admins <= 1 {
            return Err("Não é possível remover o último administrador".into());
        }
    }

    conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])
        .map_err(|e| e.to_string())?;
    info!(user_id = %user_id, "user deleted");
    Ok(())
}

/// Whether first-run setup has completed.
pub fn system_initialized(conn: &Connection) -> bool {
    db::get_setting(conn, "system", SYSTEM_INITIALIZED_KEY).as_deref() == Some("true")
}

/// First-run setup: create the admin account and mark the system
/// initialized, atomically. A second call fails whole; it can never
/// produce a duplicate admin or a half-initialized state.
pub fn bootstrap_admin(
    conn: &mut Connection,
    email: &str,
    name: &str,
    password: &str,
) -> Result<User, String> {
    let tx = conn.transaction().map_err(|e| e.to_string())?;

    let initialized =
        db::get_setting(&tx, "system", SYSTEM_INITIALIZED_KEY).as_deref() == Some("true");
    let admins: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM users WHERE role = ?1",
            params![ROLE_ADMIN],
            |row| row.get(0),
        )
        .map_err(|e| e.to_string())?;
    if initialized || admins > 0 {
        return Err("Sistema já inicializado".into());
    }

    let user = create_user(&tx, email, name, ROLE_ADMIN, password)?;
    db::set_setting(&tx, "system", SYSTEM_INITIALIZED_KEY, "true")?;

    tx.commit().map_err(|e| e.to_string())?;
    info!(user_id = %user.id, "system initialized with admin account");
    Ok(user)
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

fn create_session(auth: &AuthState, user: User) -> Value {
    let now = Utc::now();
    let session = UserSession {
        session_id: Uuid::new_v4().to_string(),
        user,
        login_time: now,
        last_activity: now,
        expires_at: now + Duration::hours(SESSION_MAX_DURATION_HOURS),
    };

    let user_json = session.to_user_json();
    let sid = session.session_id.clone();

    {
        let mut sessions = auth.sessions.lock().unwrap();
        sessions.insert(sid.clone(), session);
    }
    {
        let mut current = auth.current_session_id.lock().unwrap();
        *current = Some(sid);
    }

    serde_json::json!({
        "success": true,
        "user": user_json,
    })
}

fn get_current_session(auth: &AuthState) -> Option<UserSession> {
    let current_id = auth.current_session_id.lock().unwrap().clone()?;
    let sessions = auth.sessions.lock().unwrap();
    let session = sessions.get(&current_id)?.clone();
    if session.is_expired() {
        return None;
    }
    Some(session)
}

/// The identity of the current caller, if logged in and not expired.
pub fn current_session(auth: &AuthState) -> Option<Session> {
    get_current_session(auth).map(|s| Session {
        user_id: s.user.id,
        role: s.user.role,
    })
}

/// Reject unless the current session belongs to an admin.
pub fn require_admin(auth: &AuthState) -> Result<Session, String> {
    match current_session(auth) {
        Some(s) if s.is_admin() => Ok(s),
        Some(_) => Err("Apenas administradores podem executar esta ação".into()),
        None => Err("Sessão expirada, faça login novamente".into()),
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

/// Verify email/password against the users table and open a session.
pub fn login(arg0: Option<Value>, db: &db::DbState, auth: &AuthState) -> Result<Value, String> {
    let payload = arg0.ok_or("Missing login argument")?;
    let email = payload
        .get("email")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .ok_or("Email é obrigatório")?;
    let password = payload
        .get("password")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or("Senha é obrigatória")?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let persisted_lockout = load_lockout_from_db(&conn);
    {
        let mut lockout = auth.lockout.lock().unwrap();
        *lockout = persisted_lockout;
        check_lockout(&lockout)?;
    }

    if let Some((user, hash)) = find_user_by_email(&conn, &email) {
        if bcrypt::verify(password, &hash).unwrap_or(false) {
            let mut lockout = auth.lockout.lock().unwrap();
            reset_lockout(&mut lockout);
            persist_lockout_to_db(&conn, &lockout);
            info!(user_id = %user.id, role = %user.role, "login successful");
            return Ok(create_session(auth, user));
        }
    }

    let mut lockout = auth.lockout.lock().unwrap();
    record_failure(&mut lockout);
    persist_lockout_to_db(&conn, &lockout);
    Err("Email ou senha inválidos".into())
}

/// Invalidate the current session.
pub fn logout(auth: &AuthState) {
    let mut current = auth.current_session_id.lock().unwrap();
    if let Some(sid) = current.take() {
        let mut sessions = auth.sessions.lock().unwrap();
        sessions.remove(&sid);
        info!(session_id = %sid, "session logged out");
    }
}

/// Current session as JSON, or null.
pub fn get_session_json(auth: &AuthState) -> Value {
    match get_current_session(auth) {
        Some(s) => s.to_user_json(),
        None => Value::Null,
    }
}

/// Validate the current session, cleaning up if it expired.
pub fn validate_session(auth: &AuthState) -> Value {
    match get_current_session(auth) {
        Some(_) => serde_json::json!({ "valid": true }),
        None => {
            let mut current = auth.current_session_id.lock().unwrap();
            if let Some(sid) = current.take() {
                let mut sessions = auth.sessions.lock().unwrap();
                sessions.remove(&sid);
            }
            serde_json::json!({ "valid": false, "reason": "Session expired or not found" })
        }
    }
}

/// Refresh the inactivity timer.
pub fn track_activity(auth: &AuthState) {
    let current_id = auth.current_session_id.lock().unwrap().clone();
    if let Some(sid) = current_id {
        let mut sessions = auth.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(&sid) {
            session.last_activity = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_payload(email: &str, password: &str) -> Option<Value> {
        Some(serde_json::json!({ "email": email, "password": password }))
    }

    fn lockout_attempts(db_state: &db::DbState) -> u32 {
        let conn = db_state.conn.lock().expect("db lock");
        db::get_setting(&conn, "auth", LOCKOUT_ATTEMPTS_KEY)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
    }

    #[test]
    fn bootstrap_is_atomic_and_single_shot() {
        let db_state = db::test_state();
        let mut conn = db_state.conn.lock().expect("db lock");

        assert!(!system_initialized(&conn));

        let admin = bootstrap_admin(&mut conn, "dono@choparia.com", "Dono", "segredo1")
            .expect("first bootstrap succeeds");
        assert_eq!(admin.role, ROLE_ADMIN);
        assert!(system_initialized(&conn));

        let err = bootstrap_admin(&mut conn, "outro@choparia.com", "Outro", "segredo2")
            .expect_err("second bootstrap must fail");
        assert_eq!(err, "Sistema já inicializado");

        let admins: i64 = conn
            .query_row("SELECT COUNT(*) FROM users WHERE role = 'admin'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(admins, 1, "failed bootstrap must not leave a second admin");
    }

    #[test]
    fn login_and_role_checks_use_the_stored_role() {
        let db_state = db::test_state();
        {
            let mut conn = db_state.conn.lock().expect("db lock");
            bootstrap_admin(&mut conn, "dono@choparia.com", "Dono", "segredo1").unwrap();
            create_user(&conn, "caixa@choparia.com", "Caixa", ROLE_USER, "segredo2").unwrap();
        }

        let auth = AuthState::new();
        let result = login(login_payload("caixa@choparia.com", "segredo2"), &db_state, &auth)
            .expect("valid login");
        assert_eq!(result.get("success").and_then(Value::as_bool), Some(true));

        let session = current_session(&auth).expect("session open");
        assert_eq!(session.role, ROLE_USER);
        assert!(require_admin(&auth).is_err());

        login(login_payload("dono@choparia.com", "segredo1"), &db_state, &auth)
            .expect("admin login");
        assert!(require_admin(&auth).is_ok());

        logout(&auth);
        assert!(current_session(&auth).is_none());
        assert!(require_admin(&auth).is_err());
    }

    #[test]
    fn lockout_persists_across_auth_state_restart() {
        let db_state = db::test_state();
        let auth_before_restart = AuthState::new();

        for _ in 0..MAX_FAILED_ATTEMPTS {
            let err = login(
                login_payload("x@y.com", "errada"),
                &db_state,
                &auth_before_restart,
            )
            .expect_err("invalid login should fail");
            assert_eq!(err, "Email ou senha inválidos");
        }
        assert_eq!(lockout_attempts(&db_state), MAX_FAILED_ATTEMPTS);

        let auth_after_restart = AuthState::new();
        let err = login(
            login_payload("x@y.com", "errada"),
            &db_state,
            &auth_after_restart,
        )
        .expect_err("lockout should remain active after restart");
        assert!(err.contains("Muitas tentativas"), "got: {err}");
    }

    #[test]
    fn last_admin_cannot_be_deleted() {
        let db_state = db::test_state();
        let mut conn = db_state.conn.lock().expect("db lock");

        let admin = bootstrap_admin(&mut conn, "dono@choparia.com", "Dono", "segredo1").unwrap();
        let user = create_user(&conn, "caixa@choparia.com", "Caixa", ROLE_USER, "segredo2").unwrap();

        assert!(delete_user(&conn, &admin.id).is_err());
        delete_user(&conn, &user.id).expect("regular user can be deleted");

        let second = create_user(&conn, "socio@choparia.com", "Sócio", ROLE_ADMIN, "segredo3").unwrap();
        delete_user(&conn, &admin.id).expect("admin deletable once another exists");
        assert!(delete_user(&conn, &second.id).is_err());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db_state = db::test_state();
        let conn = db_state.conn.lock().expect("db lock");

        create_user(&conn, "caixa@choparia.com", "Caixa", ROLE_USER, "segredo2").unwrap();
        let err = create_user(&conn, "Caixa@Choparia.com", "Outra", ROLE_USER, "segredo3")
            .expect_err("same email, case-insensitive");
        assert_eq!(err, "Email já cadastrado");
    }
}
