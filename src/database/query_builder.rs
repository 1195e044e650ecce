use serde::Serialize;
use serde_json::Value;

use crate::database::models::Model;
use crate::database::record::Stored;
use crate::database::repository::Repository;
use crate::database::store::StoreError;

/// One page of results plus navigation info
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
    pub has_prev_page: bool,
    pub has_next_page: bool,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: u64, page: u32, per_page: u32) -> Self {
        let total_pages = if per_page == 0 { 0 } else { total_count.div_ceil(u64::from(per_page)) };
        let has_prev_page = page > 1;
        let has_next_page = u64::from(page) < total_pages;
        Self {
            items,
            total_count,
            page,
            per_page,
            total_pages,
            has_prev_page,
            has_next_page,
            prev_page: has_prev_page.then(|| page - 1),
            next_page: has_next_page.then(|| page + 1),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
            has_prev_page: self.has_prev_page,
            has_next_page: self.has_next_page,
            prev_page: self.prev_page,
            next_page: self.next_page,
        }
    }
}

/// Fetch page `page` (1-based) of `per_page` documents matching `criteria`,
/// ordered by `sort`. Items and total count are queried concurrently.
pub async fn paginate<T: Model>(
    repo: &Repository<T>,
    criteria: &Value,
    sort: &Value,
    page: u32,
    per_page: u32,
) -> Result<Page<Stored<T>>, StoreError> {
    let skip = u64::from(page.saturating_sub(1)) * u64::from(per_page);

    let mut items_filter = repo.query()?;
    items_filter.where_clause(criteria)?.order(sort)?.window(Some(skip), Some(u64::from(per_page)));

    let mut count_filter = repo.query()?;
    count_filter.where_clause(criteria)?;

    let (items, total_count) =
        futures::try_join!(repo.select_any(&items_filter), repo.count_filter(&count_filter))?;

    Ok(Page::new(items, total_count, page, per_page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::models::{ContactStatus, ContactUs, EntityRegistry};
    use serde_json::json;
    use std::sync::Arc;

    async fn seeded(n: usize) -> Repository<ContactUs> {
        let repo = Repository::new(Arc::new(MemoryStore::new()), Arc::new(EntityRegistry::standard()));
        for i in 0..n {
            repo.create(ContactUs {
                name: format!("Contact {:02}", i),
                phone: "01234567890".to_string(),
                address: "Somewhere".to_string(),
                message: None,
                follow_up_note: None,
                status: if i % 5 == 0 { ContactStatus::FollowedUp } else { ContactStatus::Pending },
                seo: None,
            })
            .await
            .unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn pages_through_twenty_five_documents() {
        let repo = seeded(25).await;

        let second = paginate(&repo, &json!({}), &json!({ "name": 1 }), 2, 10).await.unwrap();
        assert_eq!(second.items.len(), 10);
        assert_eq!(second.total_count, 25);
        assert_eq!(second.total_pages, 3);
        assert_eq!(second.items[0].data.name, "Contact 10");
        assert_eq!(second.prev_page, Some(1));
        assert_eq!(second.next_page, Some(3));

        let third = paginate(&repo, &json!({}), &json!({ "name": 1 }), 3, 10).await.unwrap();
        assert_eq!(third.items.len(), 5);
        assert!(!third.has_next_page);
        assert_eq!(third.next_page, None);
    }

    #[tokio::test]
    async fn criteria_apply_to_items_and_count() {
        let repo = seeded(25).await;
        let page = paginate(&repo, &json!({ "status": "followed-up" }), &json!({ "name": -1 }), 1, 10)
            .await
            .unwrap();
        assert_eq!(page.total_count, 5);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.items[0].data.name, "Contact 20");
    }

    #[tokio::test]
    async fn out_of_range_and_zero_sizes() {
        let repo = seeded(3).await;

        let beyond = paginate(&repo, &json!({}), &Value::Null, 9, 10).await.unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_count, 3);

        let zero = paginate(&repo, &json!({}), &Value::Null, 1, 0).await.unwrap();
        assert!(zero.items.is_empty());
        assert_eq!(zero.total_pages, 0);

        let page_zero = paginate(&repo, &json!({}), &Value::Null, 0, 2).await.unwrap();
        assert_eq!(page_zero.items.len(), 2);
        assert!(!page_zero.has_prev_page);
    }

    #[test]
    fn serializes_navigation_fields() {
        let page: Page<u8> = Page::new(vec![1, 2], 12, 1, 2);
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["totalPages"], 6);
        assert_eq!(value["perPage"], 2);
        assert_eq!(value["hasNextPage"], true);
        assert_eq!(value["prevPage"], Value::Null);
    }
}
