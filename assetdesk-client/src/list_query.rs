//! Entity List Query.
//!
//! One operation serves every entity kind: the kind picks the collection,
//! the rows key of the response and the table of legal filter keys.

use crate::cache::{CacheRead, CachedView, Freshness, ViewCache};
use crate::error::log_failure;
use crate::policy::RequestPolicy;
use assetdesk_core::{
    DeskResult, EntityKind, EntityRow, Filter, FilterSet, ListPage, ListQuery, ListSource,
    NetworkError, PageMeta, ValidationError, ViewKey, PAGE_KEY,
};
use serde_json::Value;
use std::sync::Arc;

pub struct EntityListQuery<S> {
    source: Arc<S>,
    cache: Arc<ViewCache>,
    policy: RequestPolicy,
}

impl<S: ListSource> EntityListQuery<S> {
    pub fn new(source: Arc<S>, cache: Arc<ViewCache>, policy: RequestPolicy) -> Self {
        Self {
            source,
            cache,
            policy,
        }
    }

    /// Fetch one page of `kind`.
    ///
    /// Filters with blank values are dropped; every other key must be a field
    /// of `kind`. Rows come back in server order and `meta` is whatever the
    /// server says it served.
    pub async fn fetch_page(
        &self,
        kind: EntityKind,
        filters: &[Filter],
        page: u32,
    ) -> DeskResult<ListPage<EntityRow>> {
        let query = checked_query(kind, filters, page)
            .inspect_err(|err| log_failure("list", err))?;
        let collection = kind.collection_path();

        let mut params: Vec<(String, String)> = query
            .filters()
            .into_iter()
            .map(|filter| (filter.key, filter.value))
            .collect();
        params.push((PAGE_KEY.to_string(), page.to_string()));

        tracing::debug!(%kind, page, filters = params.len() - 1, "Fetching list page");
        let since = self.cache.watermark(ViewKey::List(kind));
        let body = self
            .policy
            .run(collection, self.source.fetch_list(collection, &params))
            .await
            .inspect_err(|err| log_failure("list", err))?;

        let result = decode_page(kind, collection, body).inspect_err(|err| log_failure("list", err))?;
        self.cache.store(
            since,
            Some(&query.to_query_string()),
            CachedView::Page(result.clone()),
        );
        Ok(result)
    }

    /// Fetch the page described by navigation state.
    pub async fn fetch_query(&self, kind: EntityKind, query: &ListQuery) -> DeskResult<ListPage<EntityRow>> {
        self.fetch_page(kind, &query.filters(), query.page()).await
    }

    pub async fn fetch_filter_set(&self, filters: &FilterSet, page: u32) -> DeskResult<ListPage<EntityRow>> {
        self.fetch_page(filters.kind(), &filters.to_filters(), page).await
    }

    /// A previously fetched page for the same filters and page, if cached
    /// under a freshness the caller accepts.
    pub fn cached_page(
        &self,
        kind: EntityKind,
        query: &ListQuery,
        freshness: Freshness,
    ) -> Option<CacheRead<ListPage<EntityRow>>> {
        let canonical = checked_query(kind, &query.filters(), query.page()).ok()?;
        self.cache
            .get(ViewKey::List(kind), Some(&canonical.to_query_string()), freshness)?
            .filter_map(|view| match view {
                CachedView::Page(page) => Some(page),
                _ => None,
            })
    }
}

/// The query actually sent: keys checked, blank values gone.
fn checked_query(kind: EntityKind, filters: &[Filter], page: u32) -> DeskResult<ListQuery> {
    if page == 0 {
        return Err(ValidationError::invalid(PAGE_KEY, "pages start at 1").into());
    }
    let mut kept = Vec::with_capacity(filters.len());
    for filter in filters {
        if filter.value.trim().is_empty() {
            continue;
        }
        kind.require_field(&filter.key)?;
        kept.push(filter.clone());
    }
    Ok(ListQuery::from_filters(&kept, page))
}

fn decode_page(kind: EntityKind, collection: &str, mut body: Value) -> DeskResult<ListPage<EntityRow>> {
    let invalid = |reason: String| NetworkError::InvalidResponse {
        endpoint: collection.to_string(),
        reason,
    };

    let data = body
        .get_mut("data")
        .filter(|data| data.is_object())
        .ok_or_else(|| invalid("missing data object".to_string()))?;
    let meta: PageMeta = match data.get_mut("meta") {
        Some(meta) => serde_json::from_value(meta.take())
            .map_err(|err| invalid(format!("bad meta: {}", err)))?,
        None => return Err(invalid("missing meta".to_string()).into()),
    };
    let raw_rows = match data.get_mut(kind.rows_key()).map(Value::take) {
        Some(Value::Array(rows)) => rows,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return Err(invalid(format!("{} is not a list", kind.rows_key())).into()),
    };

    let rows = raw_rows
        .into_iter()
        .map(|raw| EntityRow::decode(kind, raw))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| invalid(format!("bad {} row: {}", kind, err)))?;
    Ok(ListPage { rows, meta })
}
