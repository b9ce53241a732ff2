//! Query builder for table requests

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::fetch::{Fetch, FetchBuilder};
use crate::postgrest::filter::*;
use crate::postgrest::types::*;

const CLIENT_INFO: &str = concat!("helpdesk-crm/", env!("CARGO_PKG_VERSION"));

/// Connection details shared by every request a table query sends
#[derive(Debug, Clone)]
pub(crate) struct Endpoint {
    pub url: String,
    pub key: String,
    pub token: Option<String>,
    pub client: Client,
    pub retries: u32,
}

impl Endpoint {
    pub(crate) fn decorate<'a>(&self, fetch: FetchBuilder<'a>) -> FetchBuilder<'a> {
        let token = self.token.as_deref().unwrap_or(&self.key);
        fetch
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .bearer_auth(token)
    }
}

/// Builder for a request against one table or view
#[derive(Debug, Clone)]
pub struct TableQuery {
    endpoint: Endpoint,
    table: String,
    columns: Option<String>,
    filters: Vec<Filter>,
    or_groups: Vec<String>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    count: Option<CountOption>,
}

impl TableQuery {
    pub(crate) fn new(endpoint: Endpoint, table: &str) -> Self {
        Self {
            endpoint,
            table: table.to_string(),
            columns: None,
            filters: Vec::new(),
            or_groups: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            count: None,
        }
    }

    /// Table or view this query targets
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns to return. Embedded relations use PostgREST syntax,
    /// e.g. `id,title,customer:customers!customer_id(name,email)`.
    pub fn select(mut self, columns: &str) -> Self {
        let compact: String = columns.split_whitespace().collect();
        self.columns = Some(compact);
        self
    }

    fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Filter rows where column equals a value
    pub fn eq<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(Filter::new(column, FilterOperator::Eq, value.to_string()))
    }

    /// Filter rows where column does not equal a value
    pub fn neq<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(Filter::new(column, FilterOperator::Neq, value.to_string()))
    }

    /// Filter rows where column is greater than a value
    pub fn gt<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(Filter::new(column, FilterOperator::Gt, value.to_string()))
    }

    /// Filter rows where column is greater than or equal to a value
    pub fn gte<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(Filter::new(column, FilterOperator::Gte, value.to_string()))
    }

    /// Filter rows where column is less than a value
    pub fn lt<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(Filter::new(column, FilterOperator::Lt, value.to_string()))
    }

    /// Filter rows where column is less than or equal to a value
    pub fn lte<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(Filter::new(column, FilterOperator::Lte, value.to_string()))
    }

    /// Filter rows where column matches a pattern (case sensitive)
    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.filter(Filter::new(column, FilterOperator::Like, pattern))
    }

    /// Filter rows where column matches a pattern (case insensitive)
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.filter(Filter::new(column, FilterOperator::ILike, pattern))
    }

    /// Filter rows where column is null
    pub fn is_null(self, column: &str) -> Self {
        self.filter(Filter::new(column, FilterOperator::Is, "null"))
    }

    /// Filter rows where column is not null
    pub fn not_null(self, column: &str) -> Self {
        self.filter(Filter::new(column, FilterOperator::Is, "null").negate())
    }

    /// Filter rows where column is in a list of values
    pub fn in_list<T: ToString>(self, column: &str, values: &[T]) -> Self {
        self.filter(Filter::new(column, FilterOperator::In, in_list_value(values)))
    }

    /// Keep rows matching any of the given conditions
    pub fn or(mut self, conditions: &[Filter]) -> Self {
        let members: Vec<String> = conditions.iter().map(Filter::as_group_member).collect();
        self.or_groups.push(format!("({})", members.join(",")));
        self
    }

    /// Order the results by a column. Later calls add secondary keys.
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.order.push(format!("{}.{}", column, direction));
        self
    }

    /// Limit the number of rows returned
    pub fn limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }

    /// Return rows `from..=to` (zero based, inclusive)
    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.offset = Some(from);
        self.limit = Some(to.saturating_sub(from) + 1);
        self
    }

    /// Ask the server for the exact number of matching rows
    pub fn count_exact(mut self) -> Self {
        self.count = Some(CountOption::Exact);
        self
    }

    fn has_filters(&self) -> bool {
        !self.filters.is_empty() || !self.or_groups.is_empty()
    }

    fn url(&self) -> String {
        format!("{}/rest/v1/{}", self.endpoint.url, self.table)
    }

    /// Query parameters in the order PostgREST receives them
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(columns) = &self.columns {
            params.push(("select".to_string(), columns.clone()));
        }
        for filter in &self.filters {
            params.push((filter.column.clone(), filter.expression()));
        }
        for group in &self.or_groups {
            params.push(("or".to_string(), group.clone()));
        }
        if !self.order.is_empty() {
            params.push(("order".to_string(), self.order.join(",")));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    fn prefer(&self, ret: Option<ReturnOption>) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(ret) = ret {
            parts.push(ret.as_str().to_string());
        }
        if let Some(count) = self.count {
            parts.push(format!("count={}", count.as_str()));
        }
        (!parts.is_empty()).then(|| parts.join(","))
    }

    fn read<'a>(&self, fetch: FetchBuilder<'a>) -> FetchBuilder<'a> {
        let mut fetch = self
            .endpoint
            .decorate(fetch)
            .query(&self.params())
            .retries(self.endpoint.retries);
        if let Some(prefer) = self.prefer(None) {
            fetch = fetch.header("Prefer", &prefer);
        }
        fetch
    }

    /// Execute the query and return the rows
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let url = self.url();
        let rows: Option<Vec<T>> = self.read(Fetch::get(&self.endpoint.client, &url)).execute().await?;
        Ok(rows.unwrap_or_default())
    }

    /// Execute the query with an exact count and return rows plus total
    pub async fn execute_with_count<T: DeserializeOwned>(&self) -> Result<Counted<T>> {
        let query = self.clone().count_exact();
        let url = query.url();
        let (rows, total): (Option<Vec<T>>, Option<u64>) = query
            .read(Fetch::get(&query.endpoint.client, &url))
            .execute_with_count()
            .await?;
        let rows = rows.unwrap_or_default();
        let total = total.unwrap_or(rows.len() as u64);
        Ok(Counted { rows, total })
    }

    /// Count matching rows without transferring them
    pub async fn count(&self) -> Result<u64> {
        let query = self.clone().count_exact();
        let url = query.url();
        let total = query
            .read(Fetch::head(&query.endpoint.client, &url))
            .execute_count()
            .await?;
        Ok(total.unwrap_or(0))
    }

    /// Execute the query and require exactly one row
    pub async fn single<T: DeserializeOwned>(&self) -> Result<T> {
        self.maybe_single()
            .await?
            .ok_or_else(|| Error::not_found(format!("no matching row in {}", self.table)))
    }

    /// Execute the query and return at most one row
    pub async fn maybe_single<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let mut rows = self.execute::<T>().await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(Error::validation(format!(
                "expected one row from {}, got {}",
                self.table, n
            ))),
        }
    }

    fn write<'a>(&self, fetch: FetchBuilder<'a>, ret: ReturnOption) -> FetchBuilder<'a> {
        let mut fetch = self.endpoint.decorate(fetch).query(&self.params());
        if let Some(prefer) = self.prefer(Some(ret)) {
            fetch = fetch.header("Prefer", &prefer);
        }
        fetch
    }

    fn require_filters(&self, action: &str) -> Result<()> {
        if self.has_filters() {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "refusing to {} every row of {}",
                action, self.table
            )))
        }
    }

    /// Insert a row or an array of rows
    pub async fn insert<V: Serialize + ?Sized>(&self, values: &V) -> Result<()> {
        info!(table = %self.table, "insert");
        let url = self.url();
        self.write(Fetch::post(&self.endpoint.client, &url), ReturnOption::Minimal)
            .json(values)?
            .execute_empty()
            .await
    }

    /// Insert and return the stored rows, shaped by `select` if set
    pub async fn insert_returning<V: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        values: &V,
    ) -> Result<Vec<T>> {
        info!(table = %self.table, "insert");
        let url = self.url();
        let rows: Option<Vec<T>> = self
            .write(Fetch::post(&self.endpoint.client, &url), ReturnOption::Representation)
            .json(values)?
            .execute()
            .await?;
        Ok(rows.unwrap_or_default())
    }

    /// Insert, or merge into the row that conflicts on `on_conflict`
    pub async fn upsert<V: Serialize + ?Sized>(&self, values: &V, on_conflict: &str) -> Result<()> {
        info!(table = %self.table, on_conflict, "upsert");
        let url = self.url();
        let mut params = self.params();
        params.push(("on_conflict".to_string(), on_conflict.to_string()));
        self.endpoint
            .decorate(Fetch::post(&self.endpoint.client, &url))
            .query(&params)
            .header(
                "Prefer",
                &format!("resolution=merge-duplicates,{}", ReturnOption::Minimal.as_str()),
            )
            .json(values)?
            .execute_empty()
            .await
    }

    /// Patch the filtered rows. At least one filter is required.
    pub async fn update<V: Serialize + ?Sized>(&self, values: &V) -> Result<()> {
        self.require_filters("update")?;
        info!(table = %self.table, "update");
        let url = self.url();
        self.write(Fetch::patch(&self.endpoint.client, &url), ReturnOption::Minimal)
            .json(values)?
            .execute_empty()
            .await
    }

    /// Patch the filtered rows and return them
    pub async fn update_returning<V: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        values: &V,
    ) -> Result<Vec<T>> {
        self.require_filters("update")?;
        info!(table = %self.table, "update");
        let url = self.url();
        let rows: Option<Vec<T>> = self
            .write(Fetch::patch(&self.endpoint.client, &url), ReturnOption::Representation)
            .json(values)?
            .execute()
            .await?;
        Ok(rows.unwrap_or_default())
    }

    /// Delete the filtered rows. At least one filter is required.
    pub async fn delete(&self) -> Result<()> {
        self.require_filters("delete")?;
        info!(table = %self.table, "delete");
        let url = self.url();
        self.write(Fetch::delete(&self.endpoint.client, &url), ReturnOption::Minimal)
            .execute_empty()
            .await
    }
}
