pub mod auth;
pub mod contact;
pub mod projects;
pub mod subadmins;
pub mod users;

use axum::Json;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Success envelope: `{success: true, message?, data?}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data: Some(data),
        })
    }

    pub fn with_message(message: &str, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.to_string()),
            data: Some(data),
        })
    }
}

impl ApiResponse<()> {
    pub fn message(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.to_string()),
            data: None,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * i64::from(self.limit())
    }

    pub fn pagination(&self, total_count: i64) -> Pagination {
        let limit = i64::from(self.limit());
        Pagination {
            current_page: self.page(),
            total_pages: (total_count + limit - 1) / limit,
            total_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: i64,
    pub total_count: i64,
}

/// Treats an all-whitespace query parameter as absent.
pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
