//! Authentication and user-management commands.

use serde::Deserialize;
use serde_json::Value;

use crate::{auth, db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserPayload {
    email: String,
    name: String,
    #[serde(default)]
    role: Option<String>,
    password: String,
}

fn parse_create_user_payload(arg0: Option<Value>) -> Result<CreateUserPayload, String> {
    let payload = arg0.ok_or("Missing user payload")?;
    serde_json::from_value(payload).map_err(|e| format!("Invalid user payload: {e}"))
}

fn parse_user_id_payload(arg0: Option<Value>) -> Result<String, String> {
    match arg0 {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        Some(Value::Object(map)) => ["userId", "user_id", "id"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or("Missing userId".into()),
        _ => Err("Missing userId".into()),
    }
}

#[tauri::command]
pub async fn auth_login(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::login(arg0, &db, &auth_state)
}

#[tauri::command]
pub async fn auth_logout(auth_state: tauri::State<'_, auth::AuthState>) -> Result<Value, String> {
    auth::logout(&auth_state);
    Ok(serde_json::json!({ "success": true }))
}

#[tauri::command]
pub async fn auth_get_session(
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    Ok(auth::get_session_json(&auth_state))
}

#[tauri::command]
pub async fn auth_validate_session(
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    Ok(auth::validate_session(&auth_state))
}

#[tauri::command]
pub async fn auth_track_activity(
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::track_activity(&auth_state);
    Ok(serde_json::json!({ "success": true }))
}

/// Whether first-run setup already happened. The frontend decides
/// between the setup screen and the login screen from this.
#[tauri::command]
pub async fn auth_system_initialized(
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "initialized": auth::system_initialized(&conn) }))
}

/// First-run setup: create the one admin account and flag the system as
/// initialized, in a single transaction. Needs no session; it only works
/// while no admin exists.
#[tauri::command]
pub async fn auth_bootstrap_admin(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let payload = parse_create_user_payload(arg0)?;
    let mut conn = db.conn.lock().map_err(|e| e.to_string())?;
    let user = auth::bootstrap_admin(&mut conn, &payload.email, &payload.name, &payload.password)?;
    Ok(serde_json::json!({ "success": true, "user": user.to_json() }))
}

#[tauri::command]
pub async fn users_create(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::require_admin(&auth_state)?;
    let payload = parse_create_user_payload(arg0)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let user = auth::create_user(
        &conn,
        &payload.email,
        &payload.name,
        payload.role.as_deref().unwrap_or(auth::ROLE_USER),
        &payload.password,
    )?;
    Ok(serde_json::json!({ "success": true, "user": user.to_json() }))
}

#[tauri::command]
pub async fn users_list(
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::require_admin(&auth_state)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let users: Vec<Value> = auth::list_users(&conn)?.iter().map(auth::User::to_json).collect();
    Ok(serde_json::json!({ "success": true, "users": users }))
}

#[tauri::command]
pub async fn users_delete(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let session = auth::require_admin(&auth_state)?;
    let user_id = parse_user_id_payload(arg0)?;
    if user_id == session.user_id {
        return Err("Não é possível remover a própria conta".into());
    }
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    auth::delete_user(&conn, &user_id)?;
    Ok(serde_json::json!({ "success": true }))
}
