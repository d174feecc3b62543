//! Generic CRUD access to one REST collection.

use std::fmt::Display;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::client::ApiClient;
use super::request::{segment_path, RequestDescriptor};
use super::ApiError;

const DEFAULT_PAGE_SIZE: u32 = 10;

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub total_pages: u32,
}

fn first_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl<T> Page<T> {
    pub fn empty(page: u32, page_size: u32) -> Self {
        Self {
            data: Vec::new(),
            total: 0,
            page,
            page_size,
            total_pages: 0,
        }
    }
}

/// Typed service over `endpoint`: `GET endpoint`, `GET endpoint/{id}`,
/// `POST endpoint`, `PUT endpoint/{id}`, `DELETE endpoint/{id}` and
/// `GET endpoint/search?q=`. Ids are escaped as a single path segment.
///
/// A success envelope with no data reads as an empty list or page.
pub struct ResourceService<T> {
    client: ApiClient,
    endpoint: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ResourceService<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            _marker: PhantomData,
        }
    }
}

fn with_query(desc: RequestDescriptor, params: &[(&str, &str)]) -> RequestDescriptor {
    params.iter().fold(desc, |d, (k, v)| d.query(*k, v))
}

impl<T: DeserializeOwned> ResourceService<T> {
    pub fn new(client: ApiClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            _marker: PhantomData,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn item_path(&self, id: &dyn Display) -> Result<String, ApiError> {
        let id = id.to_string();
        segment_path(&self.endpoint, &[id.as_str()])
    }

    pub async fn get_all(&self, params: &[(&str, &str)]) -> Result<Vec<T>, ApiError> {
        let desc = with_query(RequestDescriptor::get(self.endpoint.as_str()), params);
        let items: Option<Vec<T>> = self.client.fetch(&desc).await?;
        Ok(items.unwrap_or_default())
    }

    /// Request `page` (1-based) with `page_size` items, sent as `page` and
    /// `limit`.
    pub async fn get_paginated(
        &self,
        page: u32,
        page_size: u32,
        params: &[(&str, &str)],
    ) -> Result<Page<T>, ApiError> {
        let desc = with_query(RequestDescriptor::get(self.endpoint.as_str()), params)
            .query("page", page)
            .query("limit", page_size);
        let result: Option<Page<T>> = self.client.fetch(&desc).await?;
        Ok(result.unwrap_or_else(|| Page::empty(page, page_size)))
    }

    pub async fn get_by_id(&self, id: impl Display) -> Result<T, ApiError> {
        let desc = RequestDescriptor::get(self.item_path(&id)?);
        let item: Option<T> = self.client.fetch(&desc).await?;
        item.ok_or_else(|| ApiError::InvalidResponse(format!("Resource {} not found", id)))
    }

    pub async fn create<B: Serialize + ?Sized>(&self, data: &B) -> Result<T, ApiError> {
        let desc = RequestDescriptor::post(self.endpoint.as_str()).json(data)?;
        let item: Option<T> = self.client.fetch(&desc).await?;
        item.ok_or_else(|| ApiError::InvalidResponse("Create returned no resource".to_string()))
    }

    pub async fn update<B: Serialize + ?Sized>(
        &self,
        id: impl Display,
        data: &B,
    ) -> Result<T, ApiError> {
        let desc = RequestDescriptor::put(self.item_path(&id)?).json(data)?;
        let item: Option<T> = self.client.fetch(&desc).await?;
        item.ok_or_else(|| {
            ApiError::InvalidResponse(format!("Update of {} returned no resource", id))
        })
    }

    pub async fn delete(&self, id: impl Display) -> Result<(), ApiError> {
        let desc = RequestDescriptor::delete(self.item_path(&id)?);
        self.client
            .fetch::<serde_json::Value>(&desc)
            .await
            .map(|_| ())
    }

    pub async fn search(&self, query: &str, params: &[(&str, &str)]) -> Result<Vec<T>, ApiError> {
        let path = segment_path(&self.endpoint, &["search"])?;
        let desc = with_query(RequestDescriptor::get(path).query("q", query), params);
        let items: Option<Vec<T>> = self.client.fetch(&desc).await?;
        Ok(items.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_fills_missing_fields() {
        let page: Page<u32> =
            serde_json::from_value(json!({"data": [1, 2], "total": 2})).unwrap();
        assert_eq!(page.data, vec![1, 2]);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn test_page_reads_camel_case() {
        let page: Page<String> = serde_json::from_value(json!({
            "data": ["a"],
            "total": 21,
            "page": 3,
            "pageSize": 10,
            "totalPages": 3
        }))
        .unwrap();
        assert_eq!(page.page, 3);
        assert_eq!(page.total_pages, 3);
    }
}
