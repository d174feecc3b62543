//! Cache key builders, TTL presets and per-domain invalidation.

use std::time::Duration;

use super::coordinator::CacheCoordinator;

/// TTL presets by how often the data changes.
pub struct CacheTtl;

impl CacheTtl {
    /// Frequently changing data
    pub const SHORT: Duration = Duration::from_secs(60);
    pub const MEDIUM: Duration = Duration::from_secs(5 * 60);
    /// Mostly static data
    pub const LONG: Duration = Duration::from_secs(30 * 60);
    /// Configuration
    pub const VERY_LONG: Duration = Duration::from_secs(60 * 60);
    pub const STATS: Duration = Duration::from_secs(15 * 60);
}

pub struct CacheKeys;

impl CacheKeys {
    // ===== Users =====

    pub fn user_by_id(id: &str) -> String {
        format!("user:{}", id)
    }

    pub fn user_list(filters: &str) -> String {
        format!("users:list:{}", filters)
    }

    pub fn user_profile(id: &str) -> String {
        format!("user:profile:{}", id)
    }

    pub fn user_courses(id: &str) -> String {
        format!("user:courses:{}", id)
    }

    pub const USER_STATS: &'static str = "users:stats";

    // ===== Roles =====

    pub fn role_by_id(id: &str) -> String {
        format!("role:{}", id)
    }

    pub fn role_list(filters: &str) -> String {
        format!("roles:list:{}", filters)
    }

    pub const ACTIVE_ROLES: &'static str = "roles:active";
    pub const ROLE_STATS: &'static str = "roles:stats";

    // ===== Institutions =====

    pub fn institution_by_id(id: &str) -> String {
        format!("institution:{}", id)
    }

    pub fn institution_list(filters: &str) -> String {
        format!("institutions:list:{}", filters)
    }

    pub const ACTIVE_INSTITUTIONS: &'static str = "institutions:active";
    pub const INSTITUTION_STATS: &'static str = "institutions:stats";

    // ===== Courses =====

    pub fn course_by_id(id: &str) -> String {
        format!("course:{}", id)
    }

    pub fn course_list(filters: &str) -> String {
        format!("courses:list:{}", filters)
    }

    pub fn courses_by_institution(institution_id: &str) -> String {
        format!("courses:institution:{}", institution_id)
    }

    pub const ACTIVE_COURSES: &'static str = "courses:active";
    pub const COURSE_STATS: &'static str = "courses:stats";

    // ===== Auth =====

    pub fn auth_user(token: &str) -> String {
        format!("auth:user:{}", token)
    }

    pub fn auth_permissions(user_id: &str) -> String {
        format!("auth:permissions:{}", user_id)
    }

    // ===== App =====

    pub const APP_CONFIG: &'static str = "app:config";
    pub const SYSTEM_HEALTH: &'static str = "system:health";
}

impl CacheCoordinator {
    /// Drop a user's entries (when given) plus every user list and the stats.
    pub async fn invalidate_user(&self, user_id: Option<&str>) {
        if let Some(id) = user_id {
            self.delete(&CacheKeys::user_by_id(id)).await;
            self.delete(&CacheKeys::user_profile(id)).await;
            self.delete(&CacheKeys::user_courses(id)).await;
        }
        self.invalidate_pattern("users:list:").await;
        self.delete(CacheKeys::USER_STATS).await;
    }

    pub async fn invalidate_role(&self, role_id: Option<&str>) {
        if let Some(id) = role_id {
            self.delete(&CacheKeys::role_by_id(id)).await;
        }
        self.invalidate_pattern("roles:list:").await;
        self.delete(CacheKeys::ACTIVE_ROLES).await;
        self.delete(CacheKeys::ROLE_STATS).await;
    }

    pub async fn invalidate_institution(&self, institution_id: Option<&str>) {
        if let Some(id) = institution_id {
            self.delete(&CacheKeys::institution_by_id(id)).await;
        }
        self.invalidate_pattern("institutions:list:").await;
        self.delete(CacheKeys::ACTIVE_INSTITUTIONS).await;
        self.delete(CacheKeys::INSTITUTION_STATS).await;
    }

    pub async fn invalidate_course(&self, course_id: Option<&str>, institution_id: Option<&str>) {
        if let Some(id) = course_id {
            self.delete(&CacheKeys::course_by_id(id)).await;
        }
        if let Some(id) = institution_id {
            self.delete(&CacheKeys::courses_by_institution(id)).await;
        }
        self.invalidate_pattern("courses:list:").await;
        self.delete(CacheKeys::ACTIVE_COURSES).await;
        self.delete(CacheKeys::COURSE_STATS).await;
    }
}
