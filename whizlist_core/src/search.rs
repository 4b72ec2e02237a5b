//! Search over the signed-in user's loaded products, lists, folders and tags.
//!
//! Matching is a case-insensitive substring test. Nothing here touches the
//! database; callers pass in what they already hold.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::entity::prelude::{FolderModel, ListModel, ProductModel};

/// The field a query matched in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    Title,
    Name,
    Description,
    Tags,
    Website,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match<T> {
    pub item: T,
    pub matched_in: Vec<MatchField>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMatch {
    pub tag: String,
    /// Number of products carrying the tag.
    pub usage_count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    pub products: Vec<Match<ProductModel>>,
    pub lists: Vec<Match<ListModel>>,
    pub folders: Vec<Match<FolderModel>>,
    pub tags: Vec<TagMatch>,
}

/// One entry of the flattened result list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchHit<'a> {
    Product(&'a Match<ProductModel>),
    List(&'a Match<ListModel>),
    Folder(&'a Match<FolderModel>),
    Tag(&'a TagMatch),
}

impl SearchResults {
    pub fn len(&self) -> usize {
        self.products.len() + self.lists.len() + self.folders.len() + self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every hit in display order: products, lists, folders, then tags.
    pub fn all_results(&self) -> Vec<SearchHit<'_>> {
        self.products
            .iter()
            .map(SearchHit::Product)
            .chain(self.lists.iter().map(SearchHit::List))
            .chain(self.folders.iter().map(SearchHit::Folder))
            .chain(self.tags.iter().map(SearchHit::Tag))
            .collect()
    }

    /// The hit at a position of [`SearchResults::all_results`].
    pub fn get(&self, global_index: usize) -> Option<SearchHit<'_>> {
        let mut i = global_index;
        if i < self.products.len() {
            return Some(SearchHit::Product(&self.products[i]));
        }
        i -= self.products.len();
        if i < self.lists.len() {
            return Some(SearchHit::List(&self.lists[i]));
        }
        i -= self.lists.len();
        if i < self.folders.len() {
            return Some(SearchHit::Folder(&self.folders[i]));
        }
        i -= self.folders.len();
        self.tags.get(i).map(SearchHit::Tag)
    }

    /// Arrow-down selection, wrapping to the top.
    pub fn next_index(&self, current: Option<usize>) -> Option<usize> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        Some(match current {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        })
    }

    /// Arrow-up selection, wrapping to the bottom.
    pub fn previous_index(&self, current: Option<usize>) -> Option<usize> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        Some(match current {
            Some(i) if i > 0 && i <= len => i - 1,
            _ => len - 1,
        })
    }
}

/// Runs `query` against everything passed in.
///
/// A blank query returns empty results. Tags are compared case-sensitively when
/// deduplicating, so `Sale` and `sale` are reported as two tags.
pub fn search(
    query: &str,
    products: &[ProductModel],
    lists: &[ListModel],
    folders: &[FolderModel],
) -> SearchResults {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return SearchResults::default();
    }

    let mut product_hits: Vec<_> = products
        .iter()
        .filter_map(|product| {
            let matched_in = product_fields(product, &query);
            (!matched_in.is_empty()).then(|| Match {
                item: product.clone(),
                matched_in,
            })
        })
        .collect();
    product_hits.sort_by(|a, b| rank(a.item.is_pinned, &a.item.title, b.item.is_pinned, &b.item.title));

    let mut list_hits: Vec<_> = lists
        .iter()
        .filter_map(|list| {
            let matched_in = named_fields(&list.name, list.description.as_deref(), &query);
            (!matched_in.is_empty()).then(|| Match {
                item: list.clone(),
                matched_in,
            })
        })
        .collect();
    list_hits.sort_by(|a, b| rank(a.item.is_pinned, &a.item.name, b.item.is_pinned, &b.item.name));

    let mut folder_hits: Vec<_> = folders
        .iter()
        .filter_map(|folder| {
            let matched_in = named_fields(&folder.name, folder.description.as_deref(), &query);
            (!matched_in.is_empty()).then(|| Match {
                item: folder.clone(),
                matched_in,
            })
        })
        .collect();
    folder_hits.sort_by(|a, b| rank(a.item.is_pinned, &a.item.name, b.item.is_pinned, &b.item.name));

    SearchResults {
        products: product_hits,
        lists: list_hits,
        folders: folder_hits,
        tags: tag_hits(products, &query),
    }
}

fn contains(haystack: &str, query: &str) -> bool {
    haystack.to_lowercase().contains(query)
}

fn hostname(product_url: &str) -> Option<String> {
    let url = Url::parse(product_url).ok()?;
    url.host_str().map(str::to_owned)
}

fn product_fields(product: &ProductModel, query: &str) -> Vec<MatchField> {
    let mut matched_in = Vec::new();
    if contains(&product.title, query) {
        matched_in.push(MatchField::Title);
    }
    if contains(&product.description, query) {
        matched_in.push(MatchField::Description);
    }
    if product.tags.iter().any(|tag| contains(tag, query)) {
        matched_in.push(MatchField::Tags);
    }
    if hostname(&product.product_url).is_some_and(|host| contains(&host, query)) {
        matched_in.push(MatchField::Website);
    }
    matched_in
}

fn named_fields(name: &str, description: Option<&str>, query: &str) -> Vec<MatchField> {
    let mut matched_in = Vec::new();
    if contains(name, query) {
        matched_in.push(MatchField::Name);
    }
    if description.is_some_and(|d| contains(d, query)) {
        matched_in.push(MatchField::Description);
    }
    matched_in
}

/// Pinned first, then case-insensitive by label.
fn rank(a_pinned: bool, a_label: &str, b_pinned: bool, b_label: &str) -> Ordering {
    b_pinned
        .cmp(&a_pinned)
        .then_with(|| a_label.to_lowercase().cmp(&b_label.to_lowercase()))
}

fn tag_hits(products: &[ProductModel], query: &str) -> Vec<TagMatch> {
    let mut usage: HashMap<&str, usize> = HashMap::new();
    for product in products {
        let distinct: HashSet<&str> = product.tags.iter().collect();
        for tag in distinct {
            *usage.entry(tag).or_default() += 1;
        }
    }

    let mut hits: Vec<TagMatch> = usage
        .into_iter()
        .filter(|(tag, _)| contains(tag, query))
        .map(|(tag, usage_count)| TagMatch {
            tag: tag.to_owned(),
            usage_count,
        })
        .collect();
    hits.sort_by(|a, b| {
        b.usage_count
            .cmp(&a.usage_count)
            .then_with(|| a.tag.to_lowercase().cmp(&b.tag.to_lowercase()))
            .then_with(|| a.tag.cmp(&b.tag))
    });
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::prelude::Tags;
    use crate::ids::{FolderId, ListId, ProductId, UserId};
    use chrono::Utc;

    fn product(title: &str, url: &str, tags: &[&str], pinned: bool) -> ProductModel {
        let now = Utc::now();
        ProductModel {
            id: ProductId::new(),
            owner_id: UserId::new(),
            title: title.to_string(),
            description: String::new(),
            price: None,
            image_url: None,
            product_url: url.to_string(),
            is_pinned: pinned,
            tags: Tags(tags.iter().map(|t| t.to_string()).collect()),
            list_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn list(name: &str, description: Option<&str>, pinned: bool) -> ListModel {
        let now = Utc::now();
        ListModel {
            id: ListId::new(),
            owner_id: UserId::new(),
            name: name.to_string(),
            description: description.map(str::to_string),
            is_public: false,
            is_pinned: pinned,
            folder_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn folder(name: &str, pinned: bool) -> FolderModel {
        let now = Utc::now();
        FolderModel {
            id: FolderId::new(),
            owner_id: UserId::new(),
            name: name.to_string(),
            description: None,
            is_public: false,
            is_pinned: pinned,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn blank_query_finds_nothing() {
        let products = vec![product("Lamp", "https://shop.example", &["home"], false)];
        let lists = vec![list("Lamps", None, false)];
        for query in ["", "   "] {
            let results = search(query, &products, &lists, &[]);
            assert!(results.products.is_empty());
            assert!(results.lists.is_empty());
            assert!(results.folders.is_empty());
            assert!(results.tags.is_empty());
            assert!(results.is_empty());
        }
    }

    #[test]
    fn title_match_is_case_insensitive() {
        let products = vec![product("Desk LAMP", "https://shop.example", &[], false)];
        let results = search("lamp", &products, &[], &[]);
        assert_eq!(results.products.len(), 1);
        assert!(results.products[0].matched_in.contains(&MatchField::Title));
    }

    #[test]
    fn records_every_matching_field() {
        let mut lamp = product("Lamp", "https://lampworks.example/item/1", &["lamp-shade"], false);
        lamp.description = "A small lamp".to_string();
        let results = search("lamp", &[lamp], &[], &[]);
        assert_eq!(
            results.products[0].matched_in,
            vec![
                MatchField::Title,
                MatchField::Description,
                MatchField::Tags,
                MatchField::Website
            ]
        );
    }

    #[test]
    fn bad_urls_only_skip_the_website_check() {
        let products = vec![product("Lamp", "not a url", &[], false)];
        let results = search("lamp", &products, &[], &[]);
        assert_eq!(results.products[0].matched_in, vec![MatchField::Title]);

        let results = search("url", &products, &[], &[]);
        assert!(results.products.is_empty());
    }

    #[test]
    fn pinned_items_rank_first() {
        let products = vec![
            product("apple lamp", "https://a.example", &[], false),
            product("zebra lamp", "https://z.example", &[], true),
            product("Banana lamp", "https://b.example", &[], false),
        ];
        let lists = vec![list("a lamps", None, false), list("z lamps", None, true)];
        let folders = vec![folder("a lamp folder", false), folder("z lamp folder", true)];

        let results = search("lamp", &products, &lists, &folders);
        let titles: Vec<_> = results.products.iter().map(|m| m.item.title.as_str()).collect();
        assert_eq!(titles, vec!["zebra lamp", "apple lamp", "Banana lamp"]);
        assert_eq!(results.lists[0].item.name, "z lamps");
        assert_eq!(results.folders[0].item.name, "z lamp folder");
    }

    #[test]
    fn list_description_match() {
        let lists = vec![list("Gifts", Some("Birthday ideas"), false)];
        let results = search("birthday", &[], &lists, &[]);
        assert_eq!(results.lists[0].matched_in, vec![MatchField::Description]);
    }

    #[test]
    fn tags_rank_by_usage_and_keep_case() {
        let products = vec![
            product("a", "https://a.example", &["sale", "Sale"], false),
            product("b", "https://b.example", &["sale", "sale"], false),
            product("c", "https://c.example", &["wholesale"], false),
        ];
        let results = search("sale", &products, &[], &[]);
        let tags: Vec<_> = results
            .tags
            .iter()
            .map(|t| (t.tag.as_str(), t.usage_count))
            .collect();
        assert_eq!(tags, vec![("sale", 2), ("Sale", 1), ("wholesale", 1)]);
    }

    #[test]
    fn global_index_walks_categories_in_order() {
        let products = vec![product("red lamp", "https://a.example", &["red"], false)];
        let lists = vec![list("red things", None, false)];
        let folders = vec![folder("red", false)];
        let results = search("red", &products, &lists, &folders);

        assert_eq!(results.len(), 4);
        assert!(matches!(results.get(0), Some(SearchHit::Product(_))));
        assert!(matches!(results.get(1), Some(SearchHit::List(_))));
        assert!(matches!(results.get(2), Some(SearchHit::Folder(_))));
        assert!(matches!(results.get(3), Some(SearchHit::Tag(_))));
        assert!(results.get(4).is_none());
        assert_eq!(results.all_results().len(), 4);

        assert_eq!(results.next_index(None), Some(0));
        assert_eq!(results.next_index(Some(3)), Some(0));
        assert_eq!(results.previous_index(Some(0)), Some(3));
        assert_eq!(results.previous_index(None), Some(3));
    }
}
