//! Per-period statistics over the local table.
//!
//! For every eligible numeric column `c` three subqueries are grouped by the
//! primary keys and the period bucket: the mean and standard deviation, the
//! minimum with the time it was seen, and the maximum with its time. The
//! subqueries are then joined on the grouping columns into one row per
//! (keys, bucket).

use crate::error::{Error, Result};
use crate::period::Period;
use crate::schema::{Schema, quote_ident};
use erddap::SemanticType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Average of the epoch seconds of `time`, back in ISO form.
const MEAN_TIME: &str = "strftime('%Y-%m-%dT%H:%M:%SZ', datetime(avg(strftime('%s', \"time\")), 'unixepoch'))";

/// How the per-column subqueries are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinStrategy {
    /// Inner join to the first column's subqueries, left join the rest. A
    /// bucket lacking a value for the first column disappears.
    Anchored,
    /// Left join every subquery to a group over all rows.
    #[default]
    Grouped,
}

impl fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinStrategy::Anchored => "anchored",
            JoinStrategy::Grouped => "grouped",
        })
    }
}

impl FromStr for JoinStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anchored" => Ok(JoinStrategy::Anchored),
            "grouped" => Ok(JoinStrategy::Grouped),
            _ => Err(Error::InvalidJoin(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistic {
    Mean,
    Stdev,
    Minimum,
    Maximum,
}

impl Statistic {
    pub const ALL: [Statistic; 4] = [
        Statistic::Mean,
        Statistic::Stdev,
        Statistic::Minimum,
        Statistic::Maximum,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Stdev => "stdev",
            Statistic::Minimum => "minimum",
            Statistic::Maximum => "maximum",
        }
    }

    pub fn column_name(self, column: &str) -> String {
        format!("{}_{column}", self.as_str())
    }
}

/// What an output column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Key(SemanticType),
    /// Average of a coordinate axis over the bucket.
    Axis,
    /// Mean of `time` over the bucket.
    MeanTime,
    Stat(Statistic),
    /// When the minimum or maximum was observed.
    StatTime(Statistic),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    pub name: String,
    pub kind: OutputKind,
    /// The table column the value derives from.
    pub source: String,
}

impl OutputColumn {
    pub fn is_time(&self) -> bool {
        matches!(self.kind, OutputKind::MeanTime | OutputKind::StatTime(_))
    }
}

/// Aggregation of one table at one period granularity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateQuery {
    pub table: String,
    pub period: Period,
    pub keys: Vec<String>,
    pub axes: Vec<String>,
    pub columns: Vec<String>,
    pub join: JoinStrategy,
    outputs: Vec<OutputColumn>,
}

impl AggregateQuery {
    /// Eligible columns are numeric and neither keys, quality flags, axes
    /// nor buckets. At least one is required.
    pub fn build(schema: &Schema, period: Period, join: JoinStrategy) -> Result<Self> {
        schema.time_column()?;
        let remote: Vec<_> = schema.remote_columns().collect();

        let keys: Vec<&erddap::Column> = remote.iter().copied().filter(|c| c.is_identifier).collect();
        let axes: Vec<String> = remote
            .iter()
            .filter(|c| c.is_axis && !c.is_identifier && c.semantic_type.is_numeric())
            .map(|c| c.normalized_name.clone())
            .collect();
        let columns: Vec<String> = remote
            .iter()
            .filter(|c| {
                c.semantic_type.is_numeric()
                    && !c.is_identifier
                    && !c.is_quality
                    && !c.is_axis
                    && c.normalized_name != "time"
                    && !Period::is_bucket_column(&c.normalized_name)
            })
            .map(|c| c.normalized_name.clone())
            .collect();

        if columns.is_empty() {
            return Err(Error::NoNumericColumns(schema.table_name().to_string()));
        }

        let mut outputs: Vec<OutputColumn> = keys
            .iter()
            .map(|k| OutputColumn {
                name: k.normalized_name.clone(),
                kind: OutputKind::Key(k.semantic_type),
                source: k.normalized_name.clone(),
            })
            .collect();
        outputs.extend(axes.iter().map(|a| OutputColumn {
            name: a.clone(),
            kind: OutputKind::Axis,
            source: a.clone(),
        }));
        outputs.push(OutputColumn {
            name: "time".to_string(),
            kind: OutputKind::MeanTime,
            source: "time".to_string(),
        });
        for column in &columns {
            let stat = |name: String, kind: OutputKind| OutputColumn {
                name,
                kind,
                source: column.clone(),
            };
            outputs.push(stat(Statistic::Mean.column_name(column), OutputKind::Stat(Statistic::Mean)));
            outputs.push(stat(Statistic::Stdev.column_name(column), OutputKind::Stat(Statistic::Stdev)));
            for extreme in [Statistic::Minimum, Statistic::Maximum] {
                let name = extreme.column_name(column);
                let time = format!("{name}_time");
                outputs.push(stat(name, OutputKind::Stat(extreme)));
                outputs.push(stat(time, OutputKind::StatTime(extreme)));
            }
        }

        Ok(Self {
            table: schema.table_name().to_string(),
            period,
            keys: keys.iter().map(|k| k.normalized_name.clone()).collect(),
            axes,
            columns,
            join,
            outputs,
        })
    }

    pub fn output_columns(&self) -> &[OutputColumn] {
        &self.outputs
    }

    fn group_columns(&self) -> Vec<String> {
        let mut group: Vec<String> = self.keys.iter().map(|k| quote_ident(k)).collect();
        group.push(quote_ident(self.period.as_str()));
        group
    }

    fn axis_averages(&self) -> Vec<String> {
        self.axes
            .iter()
            .map(|a| format!("avg({0}) {0}", quote_ident(a)))
            .collect()
    }

    /// `SELECT keys, bucket, {aggregates} FROM table [WHERE c IS NOT NULL] GROUP BY keys, bucket`.
    fn subquery(&self, aggregates: &[String], present: Option<&str>) -> String {
        let group = self.group_columns().join(", ");
        let filter = present
            .map(|c| format!(" WHERE {} IS NOT NULL", quote_ident(c)))
            .unwrap_or_default();
        format!(
            "(SELECT {group}, {} FROM {}{filter} GROUP BY {group})",
            aggregates.join(", "),
            quote_ident(&self.table)
        )
    }

    fn mean_aggregates(column: &str) -> Vec<String> {
        let c = quote_ident(column);
        vec![
            format!("avg({c}) {}", quote_ident(&Statistic::Mean.column_name(column))),
            format!("stdev({c}) {}", quote_ident(&Statistic::Stdev.column_name(column))),
        ]
    }

    /// Relies on SQLite taking bare columns from the row that holds the
    /// min() or max() value.
    fn extreme_aggregates(column: &str, extreme: Statistic) -> Vec<String> {
        let function = match extreme {
            Statistic::Maximum => "max",
            _ => "min",
        };
        let name = extreme.column_name(column);
        vec![
            format!("{function}({}) {}", quote_ident(column), quote_ident(&name)),
            format!("\"time\" {}", quote_ident(&format!("{name}_time"))),
        ]
    }

    /// Null-safe equality on the grouping columns.
    fn join_condition(&self, left: &str, right: &str) -> String {
        self.group_columns()
            .iter()
            .map(|g| format!("{right}.{g} IS {left}.{g}"))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Alias of the subquery providing output column `output`.
    fn alias_of(&self, output: &OutputColumn) -> String {
        let index = self.columns.iter().position(|c| *c == output.source).unwrap_or(0);
        match output.kind {
            OutputKind::Key(_) | OutputKind::Axis | OutputKind::MeanTime => match self.join {
                JoinStrategy::Grouped => "g".to_string(),
                JoinStrategy::Anchored => "m0".to_string(),
            },
            OutputKind::Stat(Statistic::Mean | Statistic::Stdev) => format!("m{index}"),
            OutputKind::Stat(Statistic::Minimum) | OutputKind::StatTime(Statistic::Minimum) => {
                format!("n{index}")
            }
            OutputKind::Stat(_) | OutputKind::StatTime(_) => format!("x{index}"),
        }
    }

    pub fn to_sql(&self) -> String {
        let select: Vec<String> = self
            .outputs
            .iter()
            .map(|o| format!("{}.{}", self.alias_of(o), quote_ident(&o.name)))
            .collect();

        let mut from = Vec::new();
        let anchor = match self.join {
            JoinStrategy::Grouped => {
                let mut group = self.axis_averages();
                group.push(format!("{MEAN_TIME} \"time\""));
                from.push(format!("{} g", self.subquery(&group, None)));
                "g"
            }
            JoinStrategy::Anchored => "m0",
        };
        for (i, column) in self.columns.iter().enumerate() {
            let join = match self.join {
                JoinStrategy::Anchored if i == 0 => "JOIN",
                _ => "LEFT JOIN",
            };
            let mut mean = Vec::new();
            if self.join == JoinStrategy::Anchored && i == 0 {
                mean.extend(self.axis_averages());
                mean.push(format!("{MEAN_TIME} \"time\""));
            }
            mean.extend(Self::mean_aggregates(column));

            let parts = [
                (format!("m{i}"), mean),
                (format!("n{i}"), Self::extreme_aggregates(column, Statistic::Minimum)),
                (format!("x{i}"), Self::extreme_aggregates(column, Statistic::Maximum)),
            ];
            for (alias, aggregates) in parts {
                let sub = self.subquery(&aggregates, Some(column));
                if alias == anchor {
                    from.push(format!("{sub} {alias}"));
                } else {
                    from.push(format!(
                        "{join} {sub} {alias} ON {}",
                        self.join_condition(anchor, &alias)
                    ));
                }
            }
        }

        format!("SELECT {}\nFROM {}", select.join(",\n    "), from.join("\n"))
    }
}
