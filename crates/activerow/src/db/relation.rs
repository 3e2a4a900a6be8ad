use crate::{
    db::{
        session::Session,
        sql::{self, Term},
    },
    record::SharedRecord,
    registry::TypeRegistry,
};
use activerow_core::error::{Error, ErrorClass, ErrorOrigin};
use std::{collections::BTreeMap, rc::Rc};
use thiserror::Error as ThisError;

///
/// RelationError
///

#[derive(Debug, ThisError)]
pub enum RelationError {
    #[error("no reference declared for column '{column}' on '{class}'")]
    NoReference { class: &'static str, column: String },

    #[error("path traversal does not support multi-column links: {lhs} -> {rhs}")]
    MultiColumnLink { lhs: String, rhs: String },
}

impl From<RelationError> for Error {
    fn from(err: RelationError) -> Self {
        let class = match err {
            RelationError::NoReference { .. } => ErrorClass::Schema,
            RelationError::MultiColumnLink { .. } => ErrorClass::Unsupported,
        };
        Self::new(class, ErrorOrigin::Relation, err.to_string())
    }
}

///
/// PathLink
/// One hop in a discovered join path; columns on each side line up by
/// position.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathLink {
    pub lhs_class: &'static str,
    pub rhs_class: &'static str,
    pub lhs_columns: Vec<String>,
    pub rhs_columns: Vec<String>,
}

///
/// ReferenceGraph
///
/// Derived adjacency over every registered record class: outbound edges
/// from each class's own reference annotations, inbound edges from a scan
/// of all other classes. Built once per registry generation and memoized;
/// the inbound scan is O(classes x columns).
///

pub struct ReferenceGraph {
    outbound: BTreeMap<&'static str, BTreeMap<&'static str, Vec<&'static str>>>,
    inbound: BTreeMap<&'static str, BTreeMap<&'static str, Vec<&'static str>>>,
}

impl ReferenceGraph {
    /// Scan every registered class's descriptors for reference edges.
    #[must_use]
    pub fn build(registry: &TypeRegistry) -> Self {
        let mut outbound: BTreeMap<&'static str, BTreeMap<&'static str, Vec<&'static str>>> =
            BTreeMap::new();
        let mut inbound: BTreeMap<&'static str, BTreeMap<&'static str, Vec<&'static str>>> =
            BTreeMap::new();

        for (name, class) in registry.iter() {
            for (column, prop) in class.properties() {
                let Some(reference) = prop.references else {
                    continue;
                };
                outbound
                    .entry(name)
                    .or_default()
                    .entry(reference.class)
                    .or_default()
                    .push(*column);
                inbound
                    .entry(reference.class)
                    .or_default()
                    .entry(name)
                    .or_default()
                    .push(*column);
            }
        }

        Self { outbound, inbound }
    }

    /// Outbound references: target class -> referencing columns on `class`.
    #[must_use]
    pub fn references_of(&self, class: &str) -> BTreeMap<&'static str, Vec<&'static str>> {
        self.outbound.get(class).cloned().unwrap_or_default()
    }

    /// Inbound references: source class -> columns on it pointing at `class`.
    #[must_use]
    pub fn referenced_by(&self, class: &str) -> BTreeMap<&'static str, Vec<&'static str>> {
        self.inbound.get(class).cloned().unwrap_or_default()
    }

    /// Best-effort shortest join path between two classes.
    ///
    /// This is the historical bidirectional one-step expansion, not a true
    /// breadth-first search: outbound references are explored first, then
    /// inbound, each recursing with a decremented depth budget and an
    /// accumulating visited set; a direct hit returns immediately
    /// mid-loop, and otherwise the shorter of the best outbound-rooted and
    /// inbound-rooted paths wins, ties preferring outbound. Paths are only
    /// guaranteed shortest for small depths; treat the result as a
    /// heuristic.
    #[must_use]
    pub fn shortest_path(
        &self,
        registry: &TypeRegistry,
        from: &str,
        to: &str,
        ignore_columns: &[&str],
        max_depth: u32,
    ) -> Vec<PathLink> {
        self.search(registry, from, to, ignore_columns, max_depth, Vec::new())
    }

    fn search(
        &self,
        registry: &TypeRegistry,
        from: &str,
        to: &str,
        ignore_columns: &[&str],
        depth: u32,
        mut visited: Vec<String>,
    ) -> Vec<PathLink> {
        if depth == 0 {
            return Vec::new();
        }
        visited.push(from.to_string());

        let from_key = registry.get(from).map(|class| class.name());
        let Some(from_name) = from_key else {
            return Vec::new();
        };

        let mut outbound_best: Option<Vec<PathLink>> = None;
        for (ref_name, columns) in self.references_of(from_name) {
            if visited.iter().any(|seen| seen.as_str() == ref_name) {
                continue;
            }
            let Some(target) = registry.get(ref_name) else {
                tracing::warn!(class = ref_name, "reference to unregistered class skipped");
                continue;
            };
            if !ignore_columns.is_empty()
                && columns.iter().all(|col| ignore_columns.contains(col))
            {
                continue;
            }

            let link = PathLink {
                lhs_class: from_name,
                rhs_class: target.name(),
                lhs_columns: columns.iter().map(ToString::to_string).collect(),
                rhs_columns: vec![target.primary_key()],
            };

            if ref_name == to {
                return vec![link];
            }

            let found = self.search(
                registry,
                ref_name,
                to,
                ignore_columns,
                depth - 1,
                visited.clone(),
            );
            if !found.is_empty() {
                let mut candidate = vec![link];
                candidate.extend(found);
                if outbound_best
                    .as_ref()
                    .is_none_or(|best| candidate.len() < best.len())
                {
                    outbound_best = Some(candidate);
                }
            }
        }

        let mut inbound_best: Option<Vec<PathLink>> = None;
        let from_pk = registry
            .get(from_name)
            .map(|class| class.primary_key())
            .unwrap_or_default();
        for (ref_name, columns) in self.referenced_by(from_name) {
            if visited.iter().any(|seen| seen.as_str() == ref_name) {
                continue;
            }
            let Some(source) = registry.get(ref_name) else {
                continue;
            };
            if !ignore_columns.is_empty()
                && columns.iter().all(|col| ignore_columns.contains(col))
            {
                continue;
            }

            let link = PathLink {
                lhs_class: from_name,
                rhs_class: source.name(),
                lhs_columns: vec![from_pk.clone()],
                rhs_columns: columns.iter().map(ToString::to_string).collect(),
            };

            if ref_name == to {
                return vec![link];
            }

            let found = self.search(
                registry,
                ref_name,
                to,
                ignore_columns,
                depth - 1,
                visited.clone(),
            );
            if !found.is_empty() {
                let mut candidate = vec![link];
                candidate.extend(found);
                if inbound_best
                    .as_ref()
                    .is_none_or(|best| candidate.len() < best.len())
                {
                    inbound_best = Some(candidate);
                }
            }
        }

        match (outbound_best, inbound_best) {
            (Some(out), Some(inb)) => {
                if out.len() <= inb.len() {
                    out
                } else {
                    inb
                }
            }
            (Some(out), None) => out,
            (None, Some(inb)) => inb,
            (None, None) => Vec::new(),
        }
    }
}

impl Session {
    // ------------------------------------------------------------------
    // Single-hop traversal
    // ------------------------------------------------------------------

    /// Follow a foreign key on this record to the single related record.
    /// An empty local key yields `None`; an unrecognized class errors.
    pub fn one_to_one(
        &self,
        record: &SharedRecord,
        class: &str,
        key: &str,
        column: Option<&str>,
    ) -> Result<Option<SharedRecord>, Error> {
        let target = self.types().try_get(class)?;
        let local = record.borrow().get(key)?.clone();
        if local.is_empty() {
            return Ok(None);
        }

        let pk = target.primary_key();
        let column = column.unwrap_or(pk.as_str());

        if column == pk
            && let Some(id) = local.as_int()
            && let Some(hit) = self.cache().get(target.name(), id)
        {
            return Ok(Some(hit));
        }

        let found = self.query_equal(
            class,
            &[(column, Term::Equal(local))],
            None,
            Some(1),
            None,
        )?;
        Ok(found.into_iter().next())
    }

    /// Follow the reference declared on a column: the target class and far
    /// column come from the descriptor.
    pub fn load_reference(
        &self,
        record: &SharedRecord,
        key: &str,
    ) -> Result<Option<SharedRecord>, Error> {
        let (class_name, reference) = {
            let record = record.borrow();
            let class = record.class();
            let prop = class.properties().get(key).ok_or_else(|| {
                Error::validation(
                    ErrorOrigin::Relation,
                    format!("'{key}' is not a property of '{}'", class.name()),
                )
            })?;
            let reference = prop.references.ok_or_else(|| RelationError::NoReference {
                class: class.name(),
                column: key.to_string(),
            })?;
            (reference.class, reference)
        };

        self.one_to_one(record, class_name, key, reference.far_column)
    }

    /// All records of `class` whose `foreign_column` equals this record's
    /// `local_key` value. An empty local value means "no relation
    /// possible" and yields `None`, distinct from an empty match list.
    pub fn one_to_many(
        &self,
        record: &SharedRecord,
        class: &str,
        local_key: &str,
        foreign_column: &str,
        order: Option<&str>,
        extra: &[(&str, Term)],
        limit: Option<u64>,
    ) -> Result<Option<Vec<SharedRecord>>, Error> {
        let local = record.borrow().get(local_key)?.clone();
        if local.is_empty() {
            return Ok(None);
        }

        let mut terms: Vec<(&str, Term)> = extra.to_vec();
        terms.push((foreign_column, Term::Equal(local)));
        let found = self.query_equal(class, &terms, order, limit, None)?;
        Ok(Some(found))
    }

    // ------------------------------------------------------------------
    // Two-hop joins through a link table
    // ------------------------------------------------------------------

    /// Far side of a link-table join: records of `far_class` joined
    /// through `link_class`. Duplicate removal happens via SELECT
    /// DISTINCT, not in memory.
    #[allow(clippy::too_many_arguments)]
    pub fn one_to_many_far(
        &self,
        record: &SharedRecord,
        link_class: &str,
        local_key: &str,
        link_column: &str,
        far_class: &str,
        near_column: Option<&str>,
        far_column: Option<&str>,
        order: Option<&str>,
    ) -> Result<Option<Vec<SharedRecord>>, Error> {
        self.link_table_join(
            record, link_class, local_key, link_column, far_class, near_column, far_column,
            order, true,
        )
    }

    /// Near side of a link-table join: the link records themselves,
    /// constrained by a join to the far table.
    #[allow(clippy::too_many_arguments)]
    pub fn one_to_many_join(
        &self,
        record: &SharedRecord,
        link_class: &str,
        local_key: &str,
        link_column: &str,
        far_class: &str,
        near_column: Option<&str>,
        far_column: Option<&str>,
        order: Option<&str>,
    ) -> Result<Option<Vec<SharedRecord>>, Error> {
        self.link_table_join(
            record, link_class, local_key, link_column, far_class, near_column, far_column,
            order, false,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn link_table_join(
        &self,
        record: &SharedRecord,
        link_class: &str,
        local_key: &str,
        link_column: &str,
        far_class: &str,
        near_column: Option<&str>,
        far_column: Option<&str>,
        order: Option<&str>,
        select_far: bool,
    ) -> Result<Option<Vec<SharedRecord>>, Error> {
        let link = self.types().try_get(link_class)?;
        let far = self.types().try_get(far_class)?;

        let local = record.borrow().get(local_key)?.clone();
        if local.is_empty() {
            return Ok(None);
        }

        let far_pk = far.primary_key();
        let near_column = near_column.unwrap_or(far_pk.as_str());
        let far_column = far_column.unwrap_or(far_pk.as_str());

        let selected = if select_far { far } else { link };
        let mut select = sql::Select::from_table(link.tablename())
            .distinct()
            .join_table(far.tablename());
        for (name, _) in Self::storage_columns(selected) {
            select = select.qualified_column(selected.tablename(), name);
        }
        let statement = select
            .condition(format!(
                "{} = {}",
                sql::qualify(link.tablename(), link_column),
                sql::escape_scalar(&local)
            ))
            .condition(format!(
                "{} = {}",
                sql::qualify(link.tablename(), near_column),
                sql::qualify(far.tablename(), far_column)
            ))
            .order_by(order)
            .build();

        tracing::debug!(sql = %statement, "executing link-table join");
        let rows = self.db().query(&statement)?;
        Ok(Some(self.records_from_rows(selected, rows)?))
    }

    // ------------------------------------------------------------------
    // Reference graph
    // ------------------------------------------------------------------

    /// Outbound reference map of a class; errors on unknown classes.
    pub fn references_of(
        &self,
        class: &str,
    ) -> Result<BTreeMap<&'static str, Vec<&'static str>>, Error> {
        let class = self.types().try_get(class)?;
        Ok(self.types().reference_graph().references_of(class.name()))
    }

    /// Inbound reference map of a class; errors on unknown classes.
    pub fn referenced_by(
        &self,
        class: &str,
    ) -> Result<BTreeMap<&'static str, Vec<&'static str>>, Error> {
        let class = self.types().try_get(class)?;
        Ok(self.types().reference_graph().referenced_by(class.name()))
    }

    /// Best-effort shortest join path between two classes; see
    /// [`ReferenceGraph::shortest_path`] for the caveats.
    pub fn shortest_path(
        &self,
        from: &str,
        to: &str,
        ignore_columns: &[&str],
        max_depth: u32,
    ) -> Result<Vec<PathLink>, Error> {
        self.types().try_get(from)?;
        self.types().try_get(to)?;
        Ok(self.types().reference_graph().shortest_path(
            self.types(),
            from,
            to,
            ignore_columns,
            max_depth,
        ))
    }

    /// Walk a discovered path from a concrete record, batch-loading each
    /// hop by the accumulated key values. Multi-column links are not
    /// supported.
    pub fn instances_along_path(
        &self,
        record: &SharedRecord,
        target_class: &str,
        ignore_columns: &[&str],
        max_depth: u32,
    ) -> Result<Vec<SharedRecord>, Error> {
        let from = record.borrow().class_name();
        let path = self.shortest_path(from, target_class, ignore_columns, max_depth)?;

        let mut working = vec![Rc::clone(record)];
        for link in path {
            if link.lhs_columns.len() > 1 || link.rhs_columns.len() > 1 {
                return Err(RelationError::MultiColumnLink {
                    lhs: link.lhs_columns.join(","),
                    rhs: link.rhs_columns.join(","),
                }
                .into());
            }
            let lhs_column = &link.lhs_columns[0];
            let rhs_column = &link.rhs_columns[0];

            let mut values = Vec::with_capacity(working.len());
            for current in &working {
                let value = current.borrow().get(lhs_column)?.clone();
                if !value.is_empty() {
                    values.push(value);
                }
            }
            if values.is_empty() {
                return Ok(Vec::new());
            }

            working = self.query_equal(
                link.rhs_class,
                &[(rhs_column.as_str(), Term::In(values))],
                None,
                None,
                None,
            )?;
            if working.is_empty() {
                return Ok(Vec::new());
            }
        }

        Ok(working)
    }
}
