//! Resource Endpoints
//!
//! Typed wrappers over [`ApiClient`] for each backend resource. They only
//! build paths and bodies; every call returns the raw [`ApiResult`].

use serde::Serialize;
use serde_json::{json, Value};

use super::client::ApiClient;
use super::dto::{HelpTurn, LocationUpdate, Page, SafetyCheckRequest};
use super::error::ApiResult;

/// Query string builder that skips absent parameters
#[derive(Debug, Default)]
pub struct QueryString {
    pairs: Vec<(String, String)>,
}

impl QueryString {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter when the value is present
    pub fn push<V: ToString>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.pairs.push((key.to_string(), v.to_string()));
        }
        self
    }

    pub fn page(self, page: Page) -> Self {
        self.push("limit", page.limit).push("offset", page.offset)
    }

    /// Render as `?a=1&b=2`, or an empty string
    pub fn build(&self) -> String {
        if self.pairs.is_empty() {
            return String::new();
        }
        let joined = self
            .pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("?{}", joined)
    }
}

fn seg(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

impl ApiClient {
    /// `GET /api/health`
    pub async fn check_health(&self) -> ApiResult {
        self.get("/api/health").await
    }

    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi { client: self }
    }

    pub fn users(&self) -> UsersApi<'_> {
        UsersApi { client: self }
    }

    pub fn matching(&self) -> MatchApi<'_> {
        MatchApi { client: self }
    }

    pub fn connections(&self) -> ConnectionsApi<'_> {
        ConnectionsApi { client: self }
    }

    pub fn groups(&self) -> GroupsApi<'_> {
        GroupsApi { client: self }
    }

    pub fn events(&self) -> EventsApi<'_> {
        EventsApi { client: self }
    }

    pub fn help(&self) -> HelpApi<'_> {
        HelpApi { client: self }
    }

    pub fn onboarding(&self) -> OnboardingApi<'_> {
        OnboardingApi { client: self }
    }

    pub fn chat(&self) -> ChatApi<'_> {
        ChatApi { client: self }
    }

    pub fn safety(&self) -> SafetyApi<'_> {
        SafetyApi { client: self }
    }

    pub fn admin(&self) -> AdminApi<'_> {
        AdminApi { client: self }
    }
}

// ============ Auth ============

pub struct AuthApi<'a> {
    client: &'a ApiClient,
}

impl AuthApi<'_> {
    /// Current authenticated user
    pub async fn me(&self) -> ApiResult {
        self.client.get("/api/auth/me").await
    }
}

// ============ Users ============

pub struct UsersApi<'a> {
    client: &'a ApiClient,
}

impl UsersApi<'_> {
    /// Own profile (`{ success, user, profile }`)
    pub async fn profile(&self) -> ApiResult {
        self.client.get("/api/users/me").await
    }

    /// Student directory, excluding the current user
    pub async fn directory(&self, limit: u32, offset: u32) -> ApiResult {
        let q = QueryString::new().page(Page::new(limit, offset));
        self.client.get(&format!("/api/users{}", q.build())).await
    }

    pub async fn user(&self, id: &str) -> ApiResult {
        self.client.get(&format!("/api/users/{}", seg(id))).await
    }

    pub async fn update_profile<B: Serialize + ?Sized>(&self, id: &str, data: &B) -> ApiResult {
        self.client.put(&format!("/api/users/{}", seg(id)), data).await
    }

    /// Push a location sample; the backend enforces the geofence
    pub async fn update_location(&self, id: &str, update: LocationUpdate) -> ApiResult {
        self.client
            .patch(&format!("/api/users/{}/location", seg(id)), &update)
            .await
    }

    pub async fn settings(&self) -> ApiResult {
        self.client.get("/api/users/me/settings").await
    }

    pub async fn update_settings<B: Serialize + ?Sized>(&self, settings: &B) -> ApiResult {
        self.client.patch("/api/users/me/settings", settings).await
    }
}

// ============ Matching ============

pub struct MatchApi<'a> {
    client: &'a ApiClient,
}

impl MatchApi<'_> {
    pub async fn recommendations(&self, radius_km: Option<f64>) -> ApiResult {
        let q = QueryString::new().push("radiusKm", radius_km);
        self.client
            .get(&format!("/api/match/recommendations{}", q.build()))
            .await
    }

    /// AI-driven match proposals
    pub async fn propose(&self, payload: &Value) -> ApiResult {
        self.client.post("/api/ai-match/propose", payload).await
    }

    pub async fn confirm(&self, user_id: &str, compatibility: Option<f64>) -> ApiResult {
        self.client
            .post(
                "/api/match/confirm",
                &json!({ "userId": user_id, "compatibility": compatibility }),
            )
            .await
    }

    pub async fn mine(&self) -> ApiResult {
        self.client.get("/api/match/mine").await
    }
}

// ============ Connections ============

pub struct ConnectionsApi<'a> {
    client: &'a ApiClient,
}

impl ConnectionsApi<'_> {
    pub async fn send_request(&self, to_user_id: &str) -> ApiResult {
        self.client
            .post("/api/connections/request", &json!({ "toUserId": to_user_id }))
            .await
    }

    /// Pending requests addressed to the current user
    pub async fn requests(&self) -> ApiResult {
        self.client.get("/api/connections/requests").await
    }

    /// Accepted connections
    pub async fn list(&self) -> ApiResult {
        self.client.get("/api/connections/list").await
    }

    pub async fn accept(&self, id: &str) -> ApiResult {
        self.client
            .patch(&format!("/api/connections/{}/accept", seg(id)), &json!({}))
            .await
    }

    pub async fn reject(&self, id: &str) -> ApiResult {
        self.client
            .patch(&format!("/api/connections/{}/reject", seg(id)), &json!({}))
            .await
    }

    pub async fn status(&self, user_id: &str) -> ApiResult {
        self.client
            .get(&format!("/api/connections/status/{}", seg(user_id)))
            .await
    }

    /// Conversation id shared with a connected user
    pub async fn thread_id(&self, user_id: &str) -> ApiResult {
        self.client
            .get(&format!("/api/connections/thread/{}", seg(user_id)))
            .await
    }
}

// ============ Groups ============

pub struct GroupsApi<'a> {
    client: &'a ApiClient,
}

impl GroupsApi<'_> {
    pub async fn create(&self, data: &Value) -> ApiResult {
        self.client.post("/api/groups", data).await
    }

    pub async fn list(&self, page: Page, kind: Option<&str>) -> ApiResult {
        let q = QueryString::new().page(page).push("type", kind);
        self.client.get(&format!("/api/groups{}", q.build())).await
    }

    pub async fn get(&self, id: &str) -> ApiResult {
        self.client.get(&format!("/api/groups/{}", seg(id))).await
    }

    pub async fn join(&self, id: &str) -> ApiResult {
        self.client
            .post(&format!("/api/groups/{}/join", seg(id)), &json!({}))
            .await
    }

    pub async fn leave(&self, id: &str) -> ApiResult {
        self.client
            .post(&format!("/api/groups/{}/leave", seg(id)), &json!({}))
            .await
    }

    pub async fn mine(&self, page: Page) -> ApiResult {
        let q = QueryString::new().page(page);
        self.client
            .get(&format!("/api/groups/my/joined{}", q.build()))
            .await
    }

    pub async fn recommended(&self, limit: u32) -> ApiResult {
        self.client
            .get(&format!("/api/groups/recommended?limit={}", limit))
            .await
    }

    pub async fn ai_recommendations(&self, payload: &Value) -> ApiResult {
        self.client.post("/api/groups/recommendations", payload).await
    }

    pub async fn admin_pending(&self, page: Page) -> ApiResult {
        let q = QueryString::new().page(page);
        self.client
            .get(&format!("/api/groups/admin/pending{}", q.build()))
            .await
    }

    pub async fn admin_all(&self, status: Option<&str>, page: Page) -> ApiResult {
        let q = QueryString::new().push("status", status).page(page);
        self.client
            .get(&format!("/api/groups/admin/all{}", q.build()))
            .await
    }

    pub async fn approve(&self, id: &str) -> ApiResult {
        self.client
            .patch(&format!("/api/groups/{}/approve", seg(id)), &json!({}))
            .await
    }

    pub async fn reject(&self, id: &str, reason: &str) -> ApiResult {
        self.client
            .patch(
                &format!("/api/groups/{}/reject", seg(id)),
                &json!({ "reason": reason }),
            )
            .await
    }
}

// ============ Events ============

pub struct EventsApi<'a> {
    client: &'a ApiClient,
}

impl EventsApi<'_> {
    pub async fn create(&self, data: &Value) -> ApiResult {
        self.client.post("/api/events", data).await
    }

    pub async fn list(&self, page: Page) -> ApiResult {
        let q = QueryString::new().page(page);
        self.client.get(&format!("/api/events{}", q.build())).await
    }

    pub async fn get(&self, id: &str) -> ApiResult {
        self.client.get(&format!("/api/events/{}", seg(id))).await
    }

    pub async fn rsvp(&self, id: &str) -> ApiResult {
        self.client
            .post(&format!("/api/events/{}/rsvp", seg(id)), &json!({}))
            .await
    }

    pub async fn withdraw(&self, id: &str) -> ApiResult {
        self.client
            .post(&format!("/api/events/{}/withdraw", seg(id)), &json!({}))
            .await
    }

    /// Events the current user has RSVP'd to
    pub async fn mine(&self, page: Page) -> ApiResult {
        let q = QueryString::new().page(page);
        self.client
            .get(&format!("/api/events/my/rsvpd{}", q.build()))
            .await
    }

    pub async fn recommended(&self, limit: u32) -> ApiResult {
        self.client
            .get(&format!("/api/events/recommended?limit={}", limit))
            .await
    }

    pub async fn ai_recommendations(&self, payload: &Value) -> ApiResult {
        self.client.post("/api/events/recommendations", payload).await
    }

    pub async fn admin_pending(&self, page: Page) -> ApiResult {
        let q = QueryString::new().page(page);
        self.client
            .get(&format!("/api/events/admin/pending{}", q.build()))
            .await
    }

    pub async fn admin_all(&self, status: Option<&str>, page: Page) -> ApiResult {
        let q = QueryString::new().push("status", status).page(page);
        self.client
            .get(&format!("/api/events/admin/all{}", q.build()))
            .await
    }

    pub async fn approve(&self, id: &str) -> ApiResult {
        self.client
            .patch(&format!("/api/events/{}/approve", seg(id)), &json!({}))
            .await
    }

    pub async fn reject(&self, id: &str, reason: &str) -> ApiResult {
        self.client
            .patch(
                &format!("/api/events/{}/reject", seg(id)),
                &json!({ "reason": reason }),
            )
            .await
    }
}

// ============ Help ============

pub struct HelpApi<'a> {
    client: &'a ApiClient,
}

impl HelpApi<'_> {
    pub async fn categories(&self) -> ApiResult {
        self.client.get("/api/help/categories").await
    }

    pub async fn category(&self, id: &str) -> ApiResult {
        self.client
            .get(&format!("/api/help/categories/{}", seg(id)))
            .await
    }

    pub async fn log_journey_event(&self, data: &Value) -> ApiResult {
        self.client.post("/api/help/journeys", data).await
    }

    /// Ask the AI help assistant, passing prior turns for context
    pub async fn ask(&self, question: &str, history: &[HelpTurn]) -> ApiResult {
        tracing::debug!(
            question_len = question.len(),
            history_len = history.len(),
            "Sending AI help request"
        );
        self.client
            .post(
                "/api/help/ai",
                &json!({ "question": question, "history": history }),
            )
            .await
    }
}

// ============ Onboarding ============

pub struct OnboardingApi<'a> {
    client: &'a ApiClient,
}

impl OnboardingApi<'_> {
    /// Validate an onboarding step and get the next one
    pub async fn step(&self, payload: &Value) -> ApiResult {
        self.client.post("/api/onboarding/step", payload).await
    }
}

// ============ Chat ============

pub struct ChatApi<'a> {
    client: &'a ApiClient,
}

impl ChatApi<'_> {
    pub async fn conversations(&self, page: Page) -> ApiResult {
        let q = QueryString::new().page(page);
        self.client
            .get(&format!("/api/chat/conversations{}", q.build()))
            .await
    }

    pub async fn conversation(&self, id: &str) -> ApiResult {
        self.client
            .get(&format!("/api/chat/conversations/{}", seg(id)))
            .await
    }

    pub async fn create_conversation(&self, data: &Value) -> ApiResult {
        self.client.post("/api/chat/conversations", data).await
    }

    /// Messages of a conversation, newest `limit`, optionally before a cursor
    pub async fn messages(
        &self,
        conversation_id: &str,
        limit: Option<u32>,
        before: Option<&str>,
    ) -> ApiResult {
        let q = QueryString::new().push("limit", limit).push("before", before);
        self.client
            .get(&format!(
                "/api/chat/conversations/{}/messages{}",
                seg(conversation_id),
                q.build()
            ))
            .await
    }

    pub async fn send_message(&self, conversation_id: &str, content: &str) -> ApiResult {
        self.client
            .post(
                &format!("/api/chat/conversations/{}/messages", seg(conversation_id)),
                &json!({ "content": content }),
            )
            .await
    }

    pub async fn mark_read(&self, conversation_id: &str) -> ApiResult {
        self.client
            .post(
                &format!("/api/chat/conversations/{}/read", seg(conversation_id)),
                &json!({}),
            )
            .await
    }

    pub async fn by_community(&self, community_id: &str) -> ApiResult {
        self.client
            .get(&format!(
                "/api/chat/conversations/by-community/{}",
                seg(community_id)
            ))
            .await
    }

    pub async fn by_user(&self, user_id: &str) -> ApiResult {
        self.client
            .get(&format!("/api/chat/conversations/by-user/{}", seg(user_id)))
            .await
    }
}

// ============ Safety ============

pub struct SafetyApi<'a> {
    client: &'a ApiClient,
}

impl SafetyApi<'_> {
    /// AI content moderation check
    pub async fn check(&self, content: &str, content_type: &str) -> ApiResult {
        let body = SafetyCheckRequest {
            content: content.to_string(),
            content_type: content_type.to_string(),
        };
        self.client.post("/api/safety/check", &body).await
    }
}

// ============ Admin ============

pub struct AdminApi<'a> {
    client: &'a ApiClient,
}

impl AdminApi<'_> {
    pub async fn create_user(&self, email: &str, password: &str, role: &str, name: &str) -> ApiResult {
        self.client
            .post(
                "/api/admin/users",
                &json!({ "email": email, "password": password, "role": role, "name": name }),
            )
            .await
    }

    pub async fn users(&self, page: u32, limit: u32, search: &str) -> ApiResult {
        let q = QueryString::new()
            .push("page", Some(page))
            .push("limit", Some(limit))
            .push("search", Some(search));
        self.client.get(&format!("/api/admin/users{}", q.build())).await
    }

    pub async fn user(&self, uid: &str) -> ApiResult {
        self.client.get(&format!("/api/admin/users/{}", seg(uid))).await
    }

    pub async fn update_role(&self, uid: &str, role: &str) -> ApiResult {
        self.client
            .patch(&format!("/api/admin/users/{}/role", seg(uid)), &json!({ "role": role }))
            .await
    }

    pub async fn disable_user(&self, uid: &str, disabled: bool) -> ApiResult {
        self.client
            .patch(
                &format!("/api/admin/users/{}/disable", seg(uid)),
                &json!({ "disabled": disabled }),
            )
            .await
    }

    pub async fn delete_user(&self, uid: &str) -> ApiResult {
        self.client.delete(&format!("/api/admin/users/{}", seg(uid))).await
    }

    pub async fn stats(&self) -> ApiResult {
        self.client.get("/api/admin/analytics/stats").await
    }

    pub async fn system_health(&self) -> ApiResult {
        self.client.get("/api/admin/analytics/health").await
    }

    pub async fn settings(&self) -> ApiResult {
        self.client.get("/api/admin/settings").await
    }

    pub async fn update_settings(&self, settings: &Value) -> ApiResult {
        self.client.patch("/api/admin/settings", settings).await
    }

    pub async fn geofence_settings(&self) -> ApiResult {
        self.client.get("/api/admin/geofence-settings").await
    }

    pub async fn update_geofence_settings(&self, settings: &Value) -> ApiResult {
        self.client.patch("/api/admin/geofence-settings", settings).await
    }

    /// Run the matching graph for a user and return the raw AI response
    pub async fn test_ai_matching(
        &self,
        user_id: &str,
        tenant_id: &str,
        preferences: Option<&Value>,
    ) -> ApiResult {
        let q = QueryString::new()
            .push("userId", Some(user_id))
            .push("tenantId", Some(tenant_id))
            .push("preferences", preferences.map(|p| p.to_string()));
        self.client
            .get(&format!("/api/admin/ai/matching/test{}", q.build()))
            .await
    }
}
