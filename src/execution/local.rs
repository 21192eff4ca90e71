//! Local Resolver - aggregation queries against the canonical relations

use crate::error::{QaError, ResolutionIssue, Result};
use crate::execution::frame::{AVG_COLUMN, COUNT_COLUMN};
use crate::execution::resolver::{ranked_metric_column, Resolver};
use crate::execution::result::{DataSource, QueryResult};
use crate::execution::stats::column_correlation;
use crate::execution::store::{
    FilterClause, LocalStore, SelectBuilder, AGRI_COLUMNS, AGRI_TABLE, CLIMATE_COLUMNS, CLIMATE_TABLE,
};
use crate::intent::{Intent, MetricTag, QueryType};
use crate::inventory::SourceDescriptor;
use crate::table::Table;
use async_trait::async_trait;
use tracing::{debug, info};

pub const RANKING_LIMIT: usize = 10;

/// One of the two canonical relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub table: &'static str,
    columns: &'static [&'static str],
}

pub const AGRI: Relation = Relation {
    table: AGRI_TABLE,
    columns: AGRI_COLUMNS,
};

pub const CLIMATE: Relation = Relation {
    table: CLIMATE_TABLE,
    columns: CLIMATE_COLUMNS,
};

impl Relation {
    pub fn metric(&self) -> &'static str {
        ranked_metric_column(self.columns).unwrap_or("production_tonnes")
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }

    /// Climate for rainfall questions, agriculture for everything else.
    pub fn for_intent(intent: &Intent) -> Relation {
        if intent.has_metric(MetricTag::Rainfall) || intent.is_climate_flavored() {
            CLIMATE
        } else {
            AGRI
        }
    }

    /// State filter, plus a crop filter when the relation has crops.
    pub fn entity_filters(&self, states: &[String], crops: &[String]) -> Vec<Option<FilterClause>> {
        let mut filters = vec![FilterClause::one_of("state", states)];
        if self.has_column("crop") {
            filters.push(FilterClause::one_of("crop", crops));
        }
        filters
    }
}

fn apply(builder: SelectBuilder, filters: Vec<Option<FilterClause>>) -> SelectBuilder {
    filters.into_iter().fold(builder, |b, f| b.filter(f))
}

/// Year window for a relation: explicit years, else last N years, else the
/// last decade, else the whole history.
pub fn year_filter(intent: &Intent, relation: &Relation) -> Option<FilterClause> {
    let range = &intent.time_range;
    if let (Some(from), Some(to)) = (range.years.iter().min(), range.years.iter().max()) {
        return Some(FilterClause::YearBetween {
            column: "year".to_string(),
            from: *from,
            to: *to,
        });
    }
    let recent = range.last_n_years.or(if range.decade { Some(10) } else { None });
    recent.map(|years| FilterClause::RecentYears {
        column: "year".to_string(),
        table: relation.table.to_string(),
        years,
    })
}

pub struct LocalResolver {
    store: LocalStore,
}

impl LocalResolver {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Dispatch by query type. Errors are converted by `execute`.
    pub fn run(&self, intent: &Intent) -> Result<QueryResult> {
        let relation = Relation::for_intent(intent);
        info!(
            "Local resolution: {} over {} ({})",
            intent.query_type,
            relation.table,
            relation.metric()
        );
        match intent.query_type {
            QueryType::Comparison => self.comparison(intent, relation),
            QueryType::Trend => self.trend(intent, relation),
            QueryType::Correlation => self.correlation(intent),
            QueryType::Ranking => self.ranking(intent, relation),
            QueryType::Current | QueryType::Aggregation | QueryType::General => self.general(intent, relation),
        }
    }

    fn execute_builder(&self, builder: &SelectBuilder) -> Result<(String, Table)> {
        let (sql, params) = builder.build();
        let table = self.store.query(&sql, &params)?;
        debug!("{} rows", table.len());
        Ok((sql, table))
    }

    fn comparison(&self, intent: &Intent, relation: Relation) -> Result<QueryResult> {
        let production_family = intent.has_metric(MetricTag::Production) || intent.has_metric(MetricTag::Area);
        if intent.has_metric(MetricTag::Rainfall) && production_family {
            let (sql, table) = self.joined_state_year(intent)?;
            return Ok(QueryResult::success(table, "production_tonnes vs rainfall_mm", sql, DataSource::Local)
                .with_table(&format!("{} + {}", AGRI_TABLE, CLIMATE_TABLE)));
        }

        if intent.states.len() < 2 && intent.crops.len() >= 2 {
            let metric = AGRI.metric();
            let builder = SelectBuilder::new(AGRI.table)
                .column("crop")
                .column(&format!("AVG({}) AS {}", metric, AVG_COLUMN))
                .column(&format!("COUNT(*) AS {}", COUNT_COLUMN));
            let builder = apply(builder, AGRI.entity_filters(&intent.states, &intent.crops))
                .filter(year_filter(intent, &AGRI))
                .group_by("crop")
                .order_by(&format!("{} DESC", AVG_COLUMN));
            let (sql, mut table) = self.execute_builder(&builder)?;
            table.retain_matching("crop", &intent.crops);
            return Ok(QueryResult::success(table, metric, sql, DataSource::Local).with_table(AGRI.table));
        }

        if intent.states.len() < 2 {
            return Err(QaError::Execution(
                "comparison needs at least two states or two crops".to_string(),
            ));
        }

        let metric = relation.metric();
        let builder = SelectBuilder::new(relation.table)
            .column("state")
            .column(&format!("AVG({}) AS {}", metric, AVG_COLUMN))
            .column(&format!("COUNT(*) AS {}", COUNT_COLUMN));
        let builder = apply(builder, relation.entity_filters(&intent.states, &intent.crops))
            .filter(year_filter(intent, &relation))
            .group_by("state")
            .order_by(&format!("{} DESC", AVG_COLUMN));
        let (sql, mut table) = self.execute_builder(&builder)?;
        table.retain_matching("state", &intent.states);
        Ok(QueryResult::success(table, metric, sql, DataSource::Local).with_table(relation.table))
    }

    fn trend(&self, intent: &Intent, relation: Relation) -> Result<QueryResult> {
        let metric = relation.metric();
        let builder = SelectBuilder::new(relation.table)
            .column("year")
            .column(&format!("AVG({}) AS {}", metric, AVG_COLUMN))
            .column(&format!("COUNT(*) AS {}", COUNT_COLUMN));
        let builder = apply(builder, relation.entity_filters(&intent.states, &intent.crops))
            .filter(year_filter(intent, &relation))
            .group_by("year")
            .order_by("year ASC");
        let (sql, table) = self.execute_builder(&builder)?;
        Ok(QueryResult::success(table, metric, sql, DataSource::Local).with_table(relation.table))
    }

    fn correlation(&self, intent: &Intent) -> Result<QueryResult> {
        let (sql, table) = self.joined_state_year(intent)?;
        let coefficient = column_correlation(&table, "avg_production", "avg_rainfall");
        Ok(
            QueryResult::success(table, "production_tonnes vs rainfall_mm", sql, DataSource::Local)
                .with_table(&format!("{} + {}", AGRI_TABLE, CLIMATE_TABLE))
                .with_statistic(coefficient),
        )
    }

    fn ranking(&self, intent: &Intent, relation: Relation) -> Result<QueryResult> {
        let metric = relation.metric();
        let by_crop = !intent.crops.is_empty() && relation.has_column("crop");
        let mut builder = SelectBuilder::new(relation.table).column("state");
        if by_crop {
            builder = builder.column("crop");
        }
        builder = builder
            .column(&format!("AVG({}) AS {}", metric, AVG_COLUMN))
            .column(&format!("COUNT(*) AS {}", COUNT_COLUMN));
        let mut builder = apply(builder, relation.entity_filters(&intent.states, &intent.crops))
            .filter(year_filter(intent, &relation))
            .group_by("state");
        if by_crop {
            builder = builder.group_by("crop");
        }
        let builder = builder
            .order_by(&format!("{} DESC", AVG_COLUMN))
            .limit(RANKING_LIMIT);
        let (sql, table) = self.execute_builder(&builder)?;
        Ok(QueryResult::success(table, metric, sql, DataSource::Local).with_table(relation.table))
    }

    fn general(&self, intent: &Intent, relation: Relation) -> Result<QueryResult> {
        let metric = relation.metric();
        let op = intent.aggregation;
        let builder = SelectBuilder::new(relation.table)
            .column(&format!("{}({}) AS {}", op.sql_function(), metric, op.value_column()))
            .column(&format!("COUNT(*) AS {}", COUNT_COLUMN));
        let builder = apply(builder, relation.entity_filters(&intent.states, &intent.crops))
            .filter(year_filter(intent, &relation));
        let (sql, table) = self.execute_builder(&builder)?;
        Ok(QueryResult::success(empty_if_no_records(table), metric, sql, DataSource::Local)
            .with_table(relation.table))
    }

    /// Per-(state, year) mean production joined with mean rainfall.
    fn joined_state_year(&self, intent: &Intent) -> Result<(String, Table)> {
        let agri = SelectBuilder::new(AGRI_TABLE)
            .column("state")
            .column("year")
            .column("AVG(production_tonnes) AS avg_production");
        let agri = apply(agri, AGRI.entity_filters(&intent.states, &intent.crops))
            .group_by("state")
            .group_by("year");
        let climate = SelectBuilder::new(CLIMATE_TABLE)
            .column("state")
            .column("year")
            .column("AVG(rainfall_mm) AS avg_rainfall");
        let climate = apply(climate, CLIMATE.entity_filters(&intent.states, &intent.crops))
            .group_by("state")
            .group_by("year");

        let (agri_sql, mut params) = agri.build();
        let (climate_sql, climate_params) = climate.build();
        params.extend(climate_params);

        let sql = format!(
            "SELECT a.state AS state, a.year AS year, a.avg_production AS avg_production, \
             c.avg_rainfall AS avg_rainfall FROM ({}) a JOIN ({}) c \
             ON LOWER(a.state) = LOWER(c.state) AND a.year = c.year \
             WHERE a.avg_production IS NOT NULL AND c.avg_rainfall IS NOT NULL \
             ORDER BY a.year, a.state",
            agri_sql, climate_sql
        );
        let table = self.store.query(&sql, &params)?;
        Ok((sql, table))
    }
}

/// A summary row over zero records is no result at all.
fn empty_if_no_records(table: Table) -> Table {
    let no_records = table.len() == 1 && table.f64_at(0, COUNT_COLUMN) == Some(0.0);
    if no_records {
        Table::new(table.columns)
    } else {
        table
    }
}

#[async_trait]
impl Resolver for LocalResolver {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn execute(&self, intent: &Intent, _sources: &[SourceDescriptor]) -> QueryResult {
        match self.run(intent) {
            Ok(result) => result,
            Err(e) => {
                let relation = Relation::for_intent(intent);
                QueryResult::failure(
                    ResolutionIssue::QueryExecutionError(e.to_string()),
                    relation.metric(),
                    format!("{} query over {}", intent.query_type, relation.table),
                    DataSource::Local,
                )
                .with_table(relation.table)
            }
        }
    }
}
