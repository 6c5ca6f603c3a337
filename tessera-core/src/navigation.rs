//! Navigation link descriptors derived from resolved entities.
//!
//! Content type ids are matched against [`NavigationRules`] once, producing a
//! [`LinkStrategies`] table. Building a link is then a plain lookup by the
//! entity's content type id.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Entity;
use crate::error::{ConfigError, TesseraResult};
use crate::model::content_type_id;

/// Where a navigation link opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LinkTarget {
    #[default]
    #[serde(rename = "_self")]
    SameFrame,
    #[serde(rename = "_blank")]
    NewTab,
}

/// Kind of navigation link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Internal,
    Dialog,
    External,
}

/// Navigable link descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationLink {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    pub target: LinkTarget,
    #[serde(rename = "type")]
    pub kind: LinkKind,
}

/// How links are built for one content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStrategy {
    /// Internal page, `/{category}/{slug}` or `/{slug}`.
    Page { default_category: Option<String> },
    /// In-page dialog anchor, `#dialog:{id}`.
    Dialog,
    /// External URL, or a link to a referenced entity.
    External,
}

/// Strategy kind a rule assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Page,
    Dialog,
    External,
}

/// Pattern based rules, resolved against known content types.
#[derive(Debug, Clone)]
pub struct NavigationRules {
    rules: Vec<(Regex, RuleKind)>,
    default_categories: HashMap<String, String>,
}

impl NavigationRules {
    /// Empty rule set.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            default_categories: HashMap::new(),
        }
    }

    /// Add a rule. Earlier rules win.
    pub fn with_rule(mut self, pattern: &str, kind: RuleKind) -> TesseraResult<Self> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.rules.push((regex, kind));
        Ok(self)
    }

    /// Category used for a page type when the entity carries none.
    pub fn with_default_category(mut self, content_type_id: impl Into<String>, category: impl Into<String>) -> Self {
        self.default_categories
            .insert(content_type_id.into(), category.into());
        self
    }

    fn kind_for(&self, content_type_id: &str) -> Option<RuleKind> {
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(content_type_id))
            .map(|(_, kind)| *kind)
    }

    /// Resolve the rules against a set of content type ids.
    pub fn resolve<'a>(&self, content_type_ids: impl IntoIterator<Item = &'a str>) -> LinkStrategies {
        let mut by_content_type = HashMap::new();
        for id in content_type_ids {
            let Some(kind) = self.kind_for(id) else {
                continue;
            };
            let strategy = match kind {
                RuleKind::Page => LinkStrategy::Page {
                    default_category: self.default_categories.get(id).cloned(),
                },
                RuleKind::Dialog => LinkStrategy::Dialog,
                RuleKind::External => LinkStrategy::External,
            };
            by_content_type.insert(id.to_string(), strategy);
        }
        tracing::debug!(strategies = by_content_type.len(), "Resolved navigation link strategies");
        LinkStrategies { by_content_type }
    }
}

impl Default for NavigationRules {
    fn default() -> Self {
        let rules = vec![
            (r"^t_", RuleKind::Page),
            (r"o_dialog", RuleKind::Dialog),
            (r"(?i)^h_(external)?Link", RuleKind::External),
        ];
        Self {
            rules: rules
                .into_iter()
                .filter_map(|(pattern, kind)| Regex::new(pattern).ok().map(|r| (r, kind)))
                .collect(),
            default_categories: HashMap::from([
                ("t_article".to_string(), "blog".to_string()),
                ("t_product".to_string(), "geldanlage".to_string()),
            ]),
        }
    }
}

/// Content type id to strategy table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStrategies {
    by_content_type: HashMap<String, LinkStrategy>,
}

/// Outcome of planning a link for one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkPlan {
    Ready(NavigationLink),
    /// Build the link of `reference`, then apply `overlay` on top.
    Follow { reference: Value, overlay: LinkOverlay },
}

/// Attributes an external link entity imposes on the link of its reference.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkOverlay {
    pub id: Option<String>,
    pub title: Option<String>,
    pub query: Option<Value>,
    pub target: LinkTarget,
}

impl LinkOverlay {
    pub fn apply(self, base: NavigationLink) -> NavigationLink {
        NavigationLink {
            id: self.id,
            title: self.title,
            query: self.query,
            target: self.target,
            ..base
        }
    }
}

fn text(entity: &Entity, field: &str) -> Option<String> {
    entity
        .fields
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn present(entity: &Entity, field: &str) -> Option<Value> {
    entity.fields.get(field).filter(|v| !v.is_null()).cloned()
}

fn truthy(entity: &Entity, field: &str) -> bool {
    match entity.fields.get(field) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Null) | None => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

impl LinkStrategies {
    pub fn insert(&mut self, content_type_id: impl Into<String>, strategy: LinkStrategy) {
        self.by_content_type.insert(content_type_id.into(), strategy);
    }

    pub fn get(&self, content_type_id: &str) -> Option<&LinkStrategy> {
        self.by_content_type.get(content_type_id)
    }

    pub fn len(&self) -> usize {
        self.by_content_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_content_type.is_empty()
    }

    /// Plan the link for a resolved, localized entity.
    ///
    /// `None` when the entity's content type has no strategy.
    pub fn plan(&self, entity: &Entity) -> Option<LinkPlan> {
        let strategy = self.get(content_type_id(entity)?)?;
        let id = Some(entity.id().to_string()).filter(|id| !id.is_empty());

        let plan = match strategy {
            LinkStrategy::Page { default_category } => {
                let slug = text(entity, "slug");
                let category = text(entity, "category").or_else(|| default_category.clone());
                let href = match &category {
                    Some(category) => format!("/{}/{}", category, slug.as_deref().unwrap_or_default()),
                    None => format!("/{}", slug.as_deref().unwrap_or_default()),
                };
                LinkPlan::Ready(NavigationLink {
                    id,
                    title: text(entity, "name").or_else(|| text(entity, "title")),
                    href: Some(href),
                    slug,
                    category,
                    query: None,
                    target: LinkTarget::SameFrame,
                    kind: LinkKind::Internal,
                })
            }
            LinkStrategy::Dialog => LinkPlan::Ready(NavigationLink {
                href: id.as_ref().map(|id| format!("#dialog:{}", id)),
                id,
                title: text(entity, "title"),
                slug: None,
                category: None,
                query: None,
                target: LinkTarget::SameFrame,
                kind: LinkKind::Dialog,
            }),
            LinkStrategy::External => {
                let overlay = LinkOverlay {
                    id: id.clone(),
                    title: text(entity, "title"),
                    query: present(entity, "query"),
                    target: if truthy(entity, "useBlank") {
                        LinkTarget::NewTab
                    } else {
                        LinkTarget::SameFrame
                    },
                };
                match present(entity, "reference") {
                    Some(reference) => LinkPlan::Follow { reference, overlay },
                    None => LinkPlan::Ready(overlay.apply(NavigationLink {
                        id: None,
                        title: None,
                        href: text(entity, "url"),
                        slug: None,
                        category: None,
                        query: None,
                        target: LinkTarget::SameFrame,
                        kind: LinkKind::External,
                    })),
                }
            }
        };
        Some(plan)
    }
}
