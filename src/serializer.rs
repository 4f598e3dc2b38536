//! Rule-driven conversion of an entity graph into nested JSON.
//!
//! Every record expands its columns and relationships. Rules are dotted
//! paths relative to the record being serialized:
//!
//! * `-reviews.customer` drops `customer` from each entry of `reviews`;
//! * `items` opts a derived field in (derived fields are skipped otherwise).
//!
//! Each record type carries its own rules, merged in wherever a record of
//! that type is reached. The built-in rules keep back-references from being
//! expanded again, so the output is a finite tree.

use crate::db::Snapshot;
use crate::error::{Result, StoreError};
use crate::models::{Customer, Item, Review};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Customer(i64),
    Item(i64),
    Review(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    One(EntityRef),
    Many(Vec<EntityRef>),
}

pub trait Serializable: Serialize {
    /// Rules this record type applies to itself.
    const SERIALIZE_RULES: &'static [&'static str];

    fn relations(&self, snapshot: &Snapshot) -> Vec<(&'static str, Relation)>;

    /// Read-through views, only expanded when a rule names them.
    fn derived(&self, _snapshot: &Snapshot) -> Vec<(&'static str, Relation)> {
        Vec::new()
    }
}

impl Serializable for Customer {
    const SERIALIZE_RULES: &'static [&'static str] = &["-reviews.customer"];

    fn relations(&self, snapshot: &Snapshot) -> Vec<(&'static str, Relation)> {
        let reviews = snapshot
            .customer_reviews(self.id)
            .into_iter()
            .map(|review| EntityRef::Review(review.id))
            .collect();
        vec![("reviews", Relation::Many(reviews))]
    }

    fn derived(&self, snapshot: &Snapshot) -> Vec<(&'static str, Relation)> {
        let items = snapshot
            .customer_items(self.id)
            .into_iter()
            .map(|item| EntityRef::Item(item.id))
            .collect();
        vec![("items", Relation::Many(items))]
    }
}

impl Serializable for Item {
    const SERIALIZE_RULES: &'static [&'static str] = &["-reviews.item"];

    fn relations(&self, snapshot: &Snapshot) -> Vec<(&'static str, Relation)> {
        let reviews = snapshot
            .item_reviews(self.id)
            .into_iter()
            .map(|review| EntityRef::Review(review.id))
            .collect();
        vec![("reviews", Relation::Many(reviews))]
    }
}

impl Serializable for Review {
    const SERIALIZE_RULES: &'static [&'static str] = &["-customer.reviews", "-item.reviews"];

    fn relations(&self, _snapshot: &Snapshot) -> Vec<(&'static str, Relation)> {
        vec![
            ("customer", Relation::One(EntityRef::Customer(self.customer_id))),
            ("item", Relation::One(EntityRef::Item(self.item_id))),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rules {
    excluded: Vec<Vec<String>>,
    included: Vec<Vec<String>>,
}

impl Rules {
    pub fn parse<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Rules::default();
        for rule in rules {
            let rule = rule.as_ref().trim();
            let (negated, path) = match rule.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, rule),
            };
            let segments: Vec<String> = path
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect();
            if segments.is_empty() {
                continue;
            }
            if negated {
                parsed.excluded.push(segments);
            } else {
                parsed.included.push(segments);
            }
        }
        parsed
    }

    /// True when some rule asks for a derived field, which can reach rows
    /// outside the root's direct neighbourhood.
    pub fn opts_in(&self) -> bool {
        !self.included.is_empty()
    }

    fn merged(&self, other: &Rules) -> Rules {
        let mut merged = self.clone();
        merged.excluded.extend(other.excluded.iter().cloned());
        merged.included.extend(other.included.iter().cloned());
        merged
    }

    fn excludes(&self, field: &str) -> bool {
        self.excluded
            .iter()
            .any(|path| path.len() == 1 && path[0] == field)
    }

    fn includes(&self, field: &str) -> bool {
        self.included.iter().any(|path| path[0] == field)
    }

    // Rules that apply below `field`, with the leading segment stripped
    fn nested(&self, field: &str) -> Rules {
        let strip = |paths: &[Vec<String>]| -> Vec<Vec<String>> {
            paths
                .iter()
                .filter(|path| path.len() > 1 && path[0] == field)
                .map(|path| path[1..].to_vec())
                .collect()
        };
        Rules {
            excluded: strip(&self.excluded),
            included: strip(&self.included),
        }
    }
}

pub struct Serializer<'a> {
    snapshot: &'a Snapshot,
    max_depth: usize,
}

impl<'a> Serializer<'a> {
    pub fn new(snapshot: &'a Snapshot, max_depth: usize) -> Self {
        Self {
            snapshot,
            max_depth,
        }
    }

    pub fn to_value(&self, root: EntityRef, rules: &Rules) -> Result<Value> {
        self.serialize_ref(root, rules, 0)
    }

    fn serialize_ref(&self, entity: EntityRef, rules: &Rules, depth: usize) -> Result<Value> {
        if depth >= self.max_depth {
            return Err(StoreError::DepthExceeded {
                limit: self.max_depth,
            });
        }
        match entity {
            EntityRef::Customer(id) => {
                let customer = self.snapshot.customer(id).ok_or(StoreError::NotFound {
                    entity: "Customer",
                    id,
                })?;
                self.serialize_record(customer, rules, depth)
            }
            EntityRef::Item(id) => {
                let item = self
                    .snapshot
                    .item(id)
                    .ok_or(StoreError::NotFound { entity: "Item", id })?;
                self.serialize_record(item, rules, depth)
            }
            EntityRef::Review(id) => {
                let review = self.snapshot.review(id).ok_or(StoreError::NotFound {
                    entity: "Review",
                    id,
                })?;
                self.serialize_record(review, rules, depth)
            }
        }
    }

    fn serialize_record<R: Serializable>(
        &self,
        record: &R,
        inherited: &Rules,
        depth: usize,
    ) -> Result<Value> {
        let rules = inherited.merged(&Rules::parse(R::SERIALIZE_RULES));

        let mut out = match serde_json::to_value(record)? {
            Value::Object(columns) => columns,
            other => return Ok(other),
        };
        out.retain(|column, _| !rules.excludes(column));

        for (name, relation) in record.relations(self.snapshot) {
            if rules.excludes(name) {
                continue;
            }
            let value = self.serialize_relation(relation, &rules.nested(name), depth)?;
            out.insert(name.to_string(), value);
        }

        for (name, relation) in record.derived(self.snapshot) {
            if !rules.includes(name) || rules.excludes(name) {
                continue;
            }
            let value = self.serialize_relation(relation, &rules.nested(name), depth)?;
            out.insert(name.to_string(), value);
        }

        Ok(Value::Object(out))
    }

    fn serialize_relation(&self, relation: Relation, rules: &Rules, depth: usize) -> Result<Value> {
        match relation {
            Relation::One(target) => self.serialize_ref(target, rules, depth + 1),
            Relation::Many(targets) => targets
                .into_iter()
                .map(|target| self.serialize_ref(target, rules, depth + 1))
                .collect::<Result<Vec<Value>>>()
                .map(Value::Array),
        }
    }
}

/// Serializes `root` with its type's own rules plus `extra_rules`.
pub fn to_value(
    snapshot: &Snapshot,
    root: EntityRef,
    extra_rules: &[&str],
    max_depth: usize,
) -> Result<Value> {
    Serializer::new(snapshot, max_depth).to_value(root, &Rules::parse(extra_rules))
}
