/**
 * Group Handlers
 *
 * # Routes
 *
 * - `POST /api/groups` - Create a group (caller becomes admin)
 * - `GET /api/groups` - Groups the caller belongs to
 * - `POST /api/groups/join` - Join by code
 * - `POST /api/groups/{code}/leave` - Leave
 * - `DELETE /api/groups/{code}` - Delete (admins)
 * - `GET /api/groups/{code}/members` - Members (members only)
 * - `GET|POST /api/groups/{code}/announcements` - Notice board
 * - `DELETE /api/announcements/{id}` - Remove a notice (author or admin)
 */

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::collab::DocumentSyncBridge;
use crate::backend::error::BackendError;
use crate::backend::groups::announcements::AnnouncementBoard;
use crate::backend::groups::guard::MembershipGuard;
use crate::backend::middleware::{parse_id, ApiJson, AuthUser};
use crate::backend::store::LeaveOutcome;
use crate::shared::{AnnouncementView, GroupSummary, MemberSummary, MembershipSummary, Role};

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct JoinGroupRequest {
    #[serde(alias = "groupCode")]
    pub code: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct JoinGroupResponse {
    pub group: GroupSummary,
    pub membership: MembershipSummary,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LeaveGroupResponse {
    Left,
    Promoted { successor: Uuid },
    GroupDeleted,
}

impl From<LeaveOutcome> for LeaveGroupResponse {
    fn from(outcome: LeaveOutcome) -> Self {
        match outcome {
            LeaveOutcome::Left => LeaveGroupResponse::Left,
            LeaveOutcome::Promoted(successor) => LeaveGroupResponse::Promoted { successor },
            LeaveOutcome::GroupDeleted => LeaveGroupResponse::GroupDeleted,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PostAnnouncementRequest {
    #[serde(alias = "task")]
    pub body: String,
}

pub async fn create_group(
    State(guard): State<Arc<MembershipGuard>>,
    AuthUser(identity): AuthUser,
    ApiJson(request): ApiJson<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupSummary>), BackendError> {
    let group = guard
        .create_group(identity.user_id, &request.name, &request.description)
        .await?;
    Ok((StatusCode::CREATED, Json(group.summary(Some(Role::Admin)))))
}

pub async fn list_groups(
    State(guard): State<Arc<MembershipGuard>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<GroupSummary>>, BackendError> {
    Ok(Json(guard.list_my_groups(identity.user_id).await?))
}

pub async fn join_group(
    State(guard): State<Arc<MembershipGuard>>,
    AuthUser(identity): AuthUser,
    ApiJson(request): ApiJson<JoinGroupRequest>,
) -> Result<Json<JoinGroupResponse>, BackendError> {
    let (group, membership) = guard.join(identity.user_id, &request.code).await?;
    Ok(Json(JoinGroupResponse {
        group: group.summary(Some(membership.role)),
        membership: membership.into(),
    }))
}

pub async fn leave_group(
    State(guard): State<Arc<MembershipGuard>>,
    State(bridge): State<DocumentSyncBridge>,
    AuthUser(identity): AuthUser,
    Path(code): Path<String>,
) -> Result<Json<LeaveGroupResponse>, BackendError> {
    let (group, outcome) = guard.leave(identity.user_id, &code).await?;
    if outcome == LeaveOutcome::GroupDeleted {
        bridge.close_group(group.id).await;
    }
    Ok(Json(outcome.into()))
}

pub async fn delete_group(
    State(guard): State<Arc<MembershipGuard>>,
    State(bridge): State<DocumentSyncBridge>,
    AuthUser(identity): AuthUser,
    Path(code): Path<String>,
) -> Result<StatusCode, BackendError> {
    let group = guard.delete_group(identity.user_id, &code).await?;
    let closed = bridge.close_group(group.id).await;
    if closed > 0 {
        tracing::info!("[Groups] Closed {} live documents of {}", closed, group.code);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(guard): State<Arc<MembershipGuard>>,
    AuthUser(identity): AuthUser,
    Path(code): Path<String>,
) -> Result<Json<Vec<MemberSummary>>, BackendError> {
    Ok(Json(guard.list_members(identity.user_id, &code).await?))
}

pub async fn list_announcements(
    State(board): State<Arc<AnnouncementBoard>>,
    AuthUser(identity): AuthUser,
    Path(code): Path<String>,
) -> Result<Json<Vec<AnnouncementView>>, BackendError> {
    Ok(Json(board.list(identity.user_id, &code).await?))
}

pub async fn post_announcement(
    State(board): State<Arc<AnnouncementBoard>>,
    AuthUser(identity): AuthUser,
    Path(code): Path<String>,
    ApiJson(request): ApiJson<PostAnnouncementRequest>,
) -> Result<(StatusCode, Json<AnnouncementView>), BackendError> {
    let announcement = board.post(identity.user_id, &code, &request.body).await?;
    Ok((StatusCode::CREATED, Json(announcement)))
}

pub async fn delete_announcement(
    State(board): State<Arc<AnnouncementBoard>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, BackendError> {
    let id = parse_id(&id, "Announcement")?;
    board.delete(identity.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
