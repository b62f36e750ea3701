//! Read-only mock business data used by the demo tools

mod query;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::info;

pub use query::{QueryResult, QuerySpec, SortRule};

use crate::Result;

const MAX_PAGE_SIZE: usize = 50;

/// Catalog, orders, tickets and projects as loose JSON rows
#[derive(Debug, Clone, Default)]
pub struct MockData {
    pub catalog: Vec<Value>,
    pub orders: Vec<Value>,
    pub tickets: Vec<Value>,
    pub projects: Vec<Value>,
}

/// Filters for [`MockData::search_catalog`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSearch {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub price_min: Option<f64>,
    #[serde(default)]
    pub price_max: Option<f64>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogPage {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub results: Vec<Value>,
}

fn parse_table(raw: &str) -> Vec<Value> {
    serde_json::from_str(raw).unwrap_or_default()
}

async fn read_table(path: &Path) -> Result<Vec<Value>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

fn field_str(row: &Value, field: &str) -> String {
    match row.get(field) {
        Some(Value::String(s)) => s.to_lowercase(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string().to_lowercase(),
    }
}

fn field_f64(row: &Value, field: &str) -> f64 {
    row.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}

fn has_any_tag(row: &Value, wanted: &[String]) -> bool {
    let wanted: Vec<String> = wanted.iter().map(|t| t.to_lowercase()).collect();
    row.get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .any(|tag| wanted.contains(&tag.to_lowercase()))
        })
        .unwrap_or(false)
}

impl MockData {
    /// Data compiled into the binary.
    pub fn seeded() -> Self {
        Self {
            catalog: parse_table(include_str!("../../data/catalog.json")),
            orders: parse_table(include_str!("../../data/orders.json")),
            tickets: parse_table(include_str!("../../data/tickets.json")),
            projects: parse_table(include_str!("../../data/projects.json")),
        }
    }

    /// Load `catalog.json`, `orders.json`, `tickets.json` and `projects.json`
    /// from a directory. Missing files become empty tables.
    pub async fn load_dir(dir: &Path) -> Result<Self> {
        let data = Self {
            catalog: read_table(&dir.join("catalog.json")).await?,
            orders: read_table(&dir.join("orders.json")).await?,
            tickets: read_table(&dir.join("tickets.json")).await?,
            projects: read_table(&dir.join("projects.json")).await?,
        };
        info!(
            "Loaded mock data from {:?}: {} catalog, {} orders, {} tickets, {} projects",
            dir,
            data.catalog.len(),
            data.orders.len(),
            data.tickets.len(),
            data.projects.len()
        );
        Ok(data)
    }

    pub fn table(&self, name: &str) -> Option<&[Value]> {
        match name {
            "catalog" => Some(&self.catalog),
            "orders" => Some(&self.orders),
            "tickets" => Some(&self.tickets),
            "projects" => Some(&self.projects),
            _ => None,
        }
    }

    pub fn search_catalog(&self, search: &CatalogSearch) -> CatalogPage {
        let needle = search
            .query
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .unwrap_or_default();

        let mut items: Vec<Value> = self
            .catalog
            .iter()
            .filter(|row| {
                needle.is_empty()
                    || ["name", "category", "brand"]
                        .iter()
                        .any(|field| field_str(row, field).contains(&needle))
            })
            .filter(|row| match &search.category {
                Some(category) => field_str(row, "category") == category.to_lowercase(),
                None => true,
            })
            .filter(|row| search.tags.is_empty() || has_any_tag(row, &search.tags))
            .filter(|row| search.price_min.map_or(true, |min| field_f64(row, "price") >= min))
            .filter(|row| search.price_max.map_or(true, |max| field_f64(row, "price") <= max))
            .cloned()
            .collect();

        match search.sort.as_deref().map(str::to_lowercase).as_deref() {
            Some("price") | Some("price_asc") => {
                items.sort_by(|a, b| field_f64(a, "price").total_cmp(&field_f64(b, "price")))
            }
            Some("price_desc") => {
                items.sort_by(|a, b| field_f64(b, "price").total_cmp(&field_f64(a, "price")))
            }
            Some("rating_desc") => {
                items.sort_by(|a, b| field_f64(b, "rating").total_cmp(&field_f64(a, "rating")))
            }
            _ => {}
        }

        let page = search.page.unwrap_or(1).max(1);
        let page_size = search.page_size.unwrap_or(10).clamp(1, MAX_PAGE_SIZE);
        let total = items.len();
        let results = items
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        CatalogPage {
            total,
            page,
            page_size,
            results,
        }
    }

    /// Value counts for one catalog field. Array fields such as `tags`
    /// count each element.
    pub fn catalog_facets(&self, field: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.catalog {
            match row.get(field) {
                Some(Value::Array(values)) => {
                    for value in values.iter().filter_map(Value::as_str) {
                        *counts.entry(value.to_lowercase()).or_insert(0) += 1;
                    }
                }
                Some(Value::Null) | None => {}
                Some(_) => *counts.entry(field_str(row, field)).or_insert(0) += 1,
            }
        }
        counts
    }

    pub fn search_tickets(&self, query: Option<&str>, status: Option<&str>, tags: &[String]) -> Vec<Value> {
        let needle = query.map(|q| q.trim().to_lowercase()).unwrap_or_default();
        self.tickets
            .iter()
            .filter(|row| {
                needle.is_empty()
                    || field_str(row, "subject").contains(&needle)
                    || field_str(row, "body").contains(&needle)
            })
            .filter(|row| status.map_or(true, |s| field_str(row, "status") == s.to_lowercase()))
            .filter(|row| tags.is_empty() || has_any_tag(row, tags))
            .cloned()
            .collect()
    }

    pub fn find_order(&self, order_id: &str) -> Option<&Value> {
        self.orders
            .iter()
            .find(|row| row.get("order_id").and_then(Value::as_str) == Some(order_id))
    }

    /// Tasks of a project, or `None` for an unknown project.
    pub fn list_project_tasks(
        &self,
        project_id: &str,
        status: Option<&str>,
        assignee: Option<&str>,
    ) -> Option<Vec<Value>> {
        let project = self
            .projects
            .iter()
            .find(|row| row.get("project_id").and_then(Value::as_str) == Some(project_id))?;
        let tasks = project
            .get("tasks")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Some(
            tasks
                .into_iter()
                .filter(|task| status.map_or(true, |s| task.get("status").and_then(Value::as_str) == Some(s)))
                .filter(|task| {
                    assignee.map_or(true, |a| task.get("assignee").and_then(Value::as_str) == Some(a))
                })
                .collect(),
        )
    }

    pub fn query(&self, spec: &QuerySpec) -> QueryResult {
        query::run(self.table(spec.table.trim()).unwrap_or(&[]), spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_seeded_tables_are_populated() {
        let data = MockData::seeded();
        assert!(!data.catalog.is_empty());
        assert!(!data.orders.is_empty());
        assert!(!data.tickets.is_empty());
        assert!(!data.projects.is_empty());
    }

    #[test]
    fn test_catalog_facets_count_scalars_and_arrays() {
        let data = MockData::seeded();
        let categories = data.catalog_facets("category");
        assert_eq!(categories.values().sum::<usize>(), data.catalog.len());
        assert!(categories.get("widgets").copied().unwrap_or(0) >= 3);

        let tags = data.catalog_facets("tags");
        assert!(tags.contains_key("bestseller"));
        assert!(data.catalog_facets("no_such_field").is_empty());
    }

    #[test]
    fn test_search_catalog_filters_and_sorts() {
        let data = MockData::seeded();
        let page = data.search_catalog(&CatalogSearch {
            query: Some("widget".into()),
            price_max: Some(60.0),
            sort: Some("price_asc".into()),
            ..CatalogSearch::default()
        });

        let prices: Vec<f64> = page.results.iter().map(|r| field_f64(r, "price")).collect();
        assert!(!prices.is_empty());
        assert!(prices.windows(2).all(|w| w[0] <= w[1]));
        assert!(prices.iter().all(|p| *p <= 60.0));
    }

    #[test]
    fn test_search_catalog_clamps_paging() {
        let data = MockData::seeded();
        let page = data.search_catalog(&CatalogSearch {
            page: Some(0),
            page_size: Some(500),
            ..CatalogSearch::default()
        });
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, MAX_PAGE_SIZE);
        assert_eq!(page.results.len(), data.catalog.len());
    }

    #[test]
    fn test_search_catalog_huge_page_is_empty() {
        let data = MockData::seeded();
        let page = data.search_catalog(&CatalogSearch {
            page: Some(usize::MAX / 2),
            page_size: Some(50),
            ..CatalogSearch::default()
        });
        assert_eq!(page.total, data.catalog.len());
        assert!(page.results.is_empty());
    }

    #[test]
    fn test_lookup_helpers() {
        let data = MockData::seeded();
        assert!(data.find_order("ord-1001").is_some());
        assert!(data.find_order("nope").is_none());

        let open = data.search_tickets(None, Some("open"), &[]);
        assert!(open.iter().all(|t| t["status"] == "open"));

        let ana = data.list_project_tasks("p-1", None, Some("ana")).unwrap();
        assert_eq!(ana.len(), 2);
        assert!(data.list_project_tasks("p-404", None, None).is_none());
    }

    #[tokio::test]
    async fn test_load_dir_tolerates_missing_files() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("catalog.json"), r#"[{"sku":"x","price":1}]"#)
            .await
            .unwrap();

        let data = MockData::load_dir(tmp.path()).await.unwrap();
        assert_eq!(data.catalog.len(), 1);
        assert!(data.orders.is_empty());
    }
}
