//! Hash-grouped aggregation.

use crate::errors::{ExecError, ExecResult};
use crate::executor::Executor;
use crate::tuple_iterator::TupleIterator;
use shale::{DataType, DbError, Field, Tuple, TupleDesc};
use std::fmt;

/// The supported aggregation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
        };
        write!(f, "{}", name)
    }
}

/// Running state for one group of an integer aggregate. AVG keeps the
/// whole (sum, count) pair and divides only at emit time.
#[derive(Debug, Default, Clone)]
struct AggState {
    count: i64,
    sum: i64,
    min: Option<i32>,
    max: Option<i32>,
}

/// Aggregates an integer column, optionally grouped by another column.
/// Groups are kept in first-insertion order.
pub struct IntAggregator {
    grouping: Option<(usize, DataType)>,
    afield: usize,
    op: AggregateOp,
    groups: Vec<(Option<Field>, AggState)>,
}

impl IntAggregator {
    /// `grouping` carries the group-by field index and its type, or `None`
    /// to fold everything into a single bucket.
    pub fn new(grouping: Option<(usize, DataType)>, afield: usize, op: AggregateOp) -> Self {
        let mut groups = Vec::new();
        if grouping.is_none() {
            groups.push((None, AggState::default()));
        }
        Self {
            grouping,
            afield,
            op,
            groups,
        }
    }

    /// Folds one input tuple into its group's running aggregate.
    pub fn merge(&mut self, t: &Tuple) -> ExecResult<()> {
        let value = match t.field(self.afield) {
            Field::Int(v) => *v,
            Field::Text(_) => {
                return Err(ExecError::IllegalArgument(
                    "integer aggregate over a text field".to_string(),
                ))
            }
        };
        let key = self.grouping.map(|(g, _)| t.field(g).clone());

        let idx = match self.groups.iter().position(|(k, _)| *k == key) {
            Some(idx) => idx,
            None => {
                self.groups.push((key, AggState::default()));
                self.groups.len() - 1
            }
        };
        let state = &mut self.groups[idx].1;
        state.count += 1;
        state.sum += value as i64;
        state.min = Some(state.min.map_or(value, |m| m.min(value)));
        state.max = Some(state.max.map_or(value, |m| m.max(value)));
        Ok(())
    }

    /// One result tuple per group, in first-insertion order.
    pub fn results(&self, desc: &TupleDesc) -> ExecResult<Vec<Tuple>> {
        let mut out = Vec::with_capacity(self.groups.len());
        for (key, state) in &self.groups {
            let agg = Field::Int(self.emit(state));
            let fields = match key {
                Some(k) => vec![k.clone(), agg],
                None => vec![agg],
            };
            out.push(Tuple::new(desc.clone(), fields)?);
        }
        Ok(out)
    }

    fn emit(&self, state: &AggState) -> i32 {
        match self.op {
            AggregateOp::Count => state.count as i32,
            AggregateOp::Sum => state.sum as i32,
            AggregateOp::Min => state.min.unwrap_or(0),
            AggregateOp::Max => state.max.unwrap_or(0),
            // Integer division truncates toward zero, as required.
            AggregateOp::Avg => {
                if state.count == 0 {
                    0
                } else {
                    (state.sum / state.count) as i32
                }
            }
        }
    }
}

/// Counts tuples of a text column, optionally grouped. COUNT is the only
/// operator defined over text.
pub struct StrAggregator {
    grouping: Option<(usize, DataType)>,
    groups: Vec<(Option<Field>, i64)>,
}

impl StrAggregator {
    pub fn new(
        grouping: Option<(usize, DataType)>,
        _afield: usize,
        op: AggregateOp,
    ) -> ExecResult<Self> {
        if op != AggregateOp::Count {
            return Err(ExecError::IllegalArgument(
                "text aggregates support only count".to_string(),
            ));
        }
        let mut groups = Vec::new();
        if grouping.is_none() {
            groups.push((None, 0));
        }
        Ok(Self { grouping, groups })
    }

    pub fn merge(&mut self, t: &Tuple) -> ExecResult<()> {
        let key = self.grouping.map(|(g, _)| t.field(g).clone());
        match self.groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => self.groups.push((key, 1)),
        }
        Ok(())
    }

    pub fn results(&self, desc: &TupleDesc) -> ExecResult<Vec<Tuple>> {
        let mut out = Vec::with_capacity(self.groups.len());
        for (key, count) in &self.groups {
            let agg = Field::Int(*count as i32);
            let fields = match key {
                Some(k) => vec![k.clone(), agg],
                None => vec![agg],
            };
            out.push(Tuple::new(desc.clone(), fields)?);
        }
        Ok(out)
    }
}

enum GroupAggregator {
    Int(IntAggregator),
    Str(StrAggregator),
}

impl GroupAggregator {
    fn merge(&mut self, t: &Tuple) -> ExecResult<()> {
        match self {
            GroupAggregator::Int(a) => a.merge(t),
            GroupAggregator::Str(a) => a.merge(t),
        }
    }

    fn results(&self, desc: &TupleDesc) -> ExecResult<Vec<Tuple>> {
        match self {
            GroupAggregator::Int(a) => a.results(desc),
            GroupAggregator::Str(a) => a.results(desc),
        }
    }
}

/// The aggregation operator. Drains its child completely during `open`,
/// groups as configured, then serves one tuple per group: `(group, agg)`
/// with grouping, `(agg)` without.
pub struct Aggregate<'a> {
    child: Box<dyn Executor + 'a>,
    afield: usize,
    gfield: Option<usize>,
    op: AggregateOp,
    desc: TupleDesc,
    results: Option<TupleIterator>,
}

impl<'a> Aggregate<'a> {
    pub fn new(
        child: Box<dyn Executor + 'a>,
        afield: usize,
        gfield: Option<usize>,
        op: AggregateOp,
    ) -> ExecResult<Self> {
        let child_desc = child.tuple_desc();
        if afield >= child_desc.num_fields() {
            return Err(ExecError::IllegalArgument(
                "aggregate field is out of range".to_string(),
            ));
        }
        if let Some(g) = gfield {
            if g >= child_desc.num_fields() {
                return Err(ExecError::IllegalArgument(
                    "group-by field is out of range".to_string(),
                ));
            }
        }
        if child_desc.field_type(afield) == DataType::Text && op != AggregateOp::Count {
            return Err(ExecError::IllegalArgument(
                "text aggregates support only count".to_string(),
            ));
        }

        let agg_name = format!(
            "{} ({})",
            op,
            child_desc.field_name(afield).unwrap_or("")
        );
        let desc = match gfield {
            Some(g) => TupleDesc::with_names(vec![
                (
                    child_desc.field_type(g),
                    child_desc.field_name(g).map(str::to_string),
                ),
                (DataType::Int, Some(agg_name)),
            ]),
            None => TupleDesc::with_names(vec![(DataType::Int, Some(agg_name))]),
        };

        Ok(Self {
            child,
            afield,
            gfield,
            op,
            desc,
            results: None,
        })
    }

    fn build_aggregator(&self) -> ExecResult<GroupAggregator> {
        let child_desc = self.child.tuple_desc();
        let grouping = self.gfield.map(|g| (g, child_desc.field_type(g)));
        match child_desc.field_type(self.afield) {
            DataType::Int => Ok(GroupAggregator::Int(IntAggregator::new(
                grouping,
                self.afield,
                self.op,
            ))),
            DataType::Text => Ok(GroupAggregator::Str(StrAggregator::new(
                grouping,
                self.afield,
                self.op,
            )?)),
        }
    }
}

impl Executor for Aggregate<'_> {
    fn open(&mut self) -> ExecResult<()> {
        let mut agg = self.build_aggregator()?;
        self.child.open()?;
        while let Some(t) = self.child.next()? {
            agg.merge(&t)?;
        }
        let mut results = TupleIterator::new(self.desc.clone(), agg.results(&self.desc)?);
        results.open()?;
        self.results = Some(results);
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        match self.results.as_mut() {
            Some(results) => results.next(),
            None => Err(DbError::invalid("operator is not open").into()),
        }
    }

    fn rewind(&mut self) -> ExecResult<()> {
        match self.results.as_mut() {
            Some(results) => results.rewind(),
            None => Err(DbError::invalid("operator is not open").into()),
        }
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grouped_desc() -> TupleDesc {
        TupleDesc::with_names(vec![
            (DataType::Text, Some("name".to_string())),
            (DataType::Int, Some("val".to_string())),
        ])
    }

    fn grouped_rows(rows: &[(&str, i32)]) -> TupleIterator {
        let desc = grouped_desc();
        let tuples = rows
            .iter()
            .map(|(name, val)| {
                Tuple::new(
                    desc.clone(),
                    vec![Field::Text(name.to_string()), Field::Int(*val)],
                )
                .unwrap()
            })
            .collect();
        TupleIterator::new(desc, tuples)
    }

    fn drain(exec: &mut dyn Executor) -> Vec<(String, i32)> {
        let mut out = Vec::new();
        while let Some(t) = exec.next().unwrap() {
            let Field::Text(group) = t.field(0) else {
                panic!("expected a text group field");
            };
            let Field::Int(agg) = t.field(1) else {
                panic!("expected an int aggregate field");
            };
            out.push((group.clone(), *agg));
        }
        out
    }

    #[test]
    fn grouped_avg_truncates_toward_zero() {
        let child = grouped_rows(&[("A", 1), ("A", 3), ("B", 2), ("B", 4), ("A", 5)]);
        let mut agg =
            Aggregate::new(Box::new(child), 1, Some(0), AggregateOp::Avg).unwrap();
        agg.open().unwrap();

        let mut rows = drain(&mut agg);
        rows.sort();
        assert_eq!(rows, vec![("A".to_string(), 3), ("B".to_string(), 3)]);
    }

    #[test]
    fn count_matches_group_sizes_and_extrema_hold() {
        let input = [("A", 7), ("B", -2), ("A", 9), ("A", -1), ("B", 5)];
        for (op, expect) in [
            (AggregateOp::Count, vec![("A".to_string(), 3), ("B".to_string(), 2)]),
            (AggregateOp::Min, vec![("A".to_string(), -1), ("B".to_string(), -2)]),
            (AggregateOp::Max, vec![("A".to_string(), 9), ("B".to_string(), 5)]),
            (AggregateOp::Sum, vec![("A".to_string(), 15), ("B".to_string(), 3)]),
        ] {
            let child = grouped_rows(&input);
            let mut agg = Aggregate::new(Box::new(child), 1, Some(0), op).unwrap();
            agg.open().unwrap();
            let mut rows = drain(&mut agg);
            rows.sort();
            assert_eq!(rows, expect, "op {}", op);
        }
    }

    #[test]
    fn sum_and_count_reproduce_avg() {
        let input = [("A", 10), ("A", 5), ("A", 6), ("B", -7), ("B", -2)];
        let run = |op| {
            let child = grouped_rows(&input);
            let mut agg = Aggregate::new(Box::new(child), 1, Some(0), op).unwrap();
            agg.open().unwrap();
            let mut rows = drain(&mut agg);
            rows.sort();
            rows
        };
        let sums = run(AggregateOp::Sum);
        let counts = run(AggregateOp::Count);
        let avgs = run(AggregateOp::Avg);
        for ((g, sum), ((_, count), (_, avg))) in
            sums.iter().zip(counts.iter().zip(avgs.iter()))
        {
            assert_eq!(sum / count, *avg, "group {}", g);
        }
        // Truncation toward zero on the negative group.
        assert!(avgs.contains(&("B".to_string(), -4)));
    }

    #[test]
    fn groups_emit_in_first_insertion_order() {
        let child = grouped_rows(&[("B", 1), ("A", 2), ("B", 3)]);
        let mut agg =
            Aggregate::new(Box::new(child), 1, Some(0), AggregateOp::Count).unwrap();
        agg.open().unwrap();
        let rows = drain(&mut agg);
        assert_eq!(rows, vec![("B".to_string(), 2), ("A".to_string(), 1)]);
    }

    #[test]
    fn no_grouping_folds_into_a_single_bucket() {
        let child = grouped_rows(&[("A", 4), ("B", 8)]);
        let mut agg = Aggregate::new(Box::new(child), 1, None, AggregateOp::Sum).unwrap();
        agg.open().unwrap();
        let t = agg.next().unwrap().unwrap();
        assert_eq!(t.desc().num_fields(), 1);
        assert_eq!(t.field(0), &Field::Int(12));
        assert!(agg.next().unwrap().is_none());
    }

    #[test]
    fn no_grouping_over_empty_input_still_counts_zero() {
        let child = grouped_rows(&[]);
        let mut agg = Aggregate::new(Box::new(child), 1, None, AggregateOp::Count).unwrap();
        agg.open().unwrap();
        let t = agg.next().unwrap().unwrap();
        assert_eq!(t.field(0), &Field::Int(0));
    }

    #[test]
    fn counting_a_text_column_groups_by_value() {
        let child = grouped_rows(&[("A", 0), ("B", 0), ("A", 0)]);
        // Aggregate over the text column itself.
        let mut agg =
            Aggregate::new(Box::new(child), 0, Some(0), AggregateOp::Count).unwrap();
        agg.open().unwrap();
        let mut rows = drain(&mut agg);
        rows.sort();
        assert_eq!(rows, vec![("A".to_string(), 2), ("B".to_string(), 1)]);
    }

    #[test]
    fn non_count_over_text_is_rejected_at_construction() {
        for op in [
            AggregateOp::Min,
            AggregateOp::Max,
            AggregateOp::Sum,
            AggregateOp::Avg,
        ] {
            let child = grouped_rows(&[("A", 1)]);
            let result = Aggregate::new(Box::new(child), 0, None, op);
            assert!(
                matches!(result, Err(ExecError::IllegalArgument(_))),
                "op {} should be rejected over text",
                op
            );
        }
    }

    #[test]
    fn output_schema_names_the_aggregate_column() {
        let child = grouped_rows(&[("A", 1)]);
        let agg = Aggregate::new(Box::new(child), 1, Some(0), AggregateOp::Avg).unwrap();
        let desc = agg.tuple_desc();
        assert_eq!(desc.num_fields(), 2);
        assert_eq!(desc.field_name(0), Some("name"));
        assert_eq!(desc.field_name(1), Some("avg (val)"));
    }

    #[test]
    fn rewind_replays_the_groups_without_redraining() {
        let child = grouped_rows(&[("A", 1), ("B", 2)]);
        let mut agg =
            Aggregate::new(Box::new(child), 1, Some(0), AggregateOp::Count).unwrap();
        agg.open().unwrap();
        let first = drain(&mut agg);
        agg.rewind().unwrap();
        let second = drain(&mut agg);
        assert_eq!(first, second);
    }
}
