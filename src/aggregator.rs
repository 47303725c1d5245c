//! Read-only query surface over persisted rows: summary KPIs, project and
//! department roll-ups, anomaly listings and monthly trends. Pure in-memory
//! computation over whatever `Store::read_rows` returns for the requested
//! months — no caching, no state carried between calls.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::anomaly::AnomalyKind;
use crate::models::attendance::AttendanceStatus;
use crate::models::travel::{TravelKind, TravelRow, UNKNOWN_PROJECT_CODE};
use crate::month::YearMonth;
use crate::store::{RowKinds, RowSet, Store};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OrderBreakdown {
    pub flight: u64,
    pub hotel: u64,
    pub train: u64,
    pub total: u64,
}

impl OrderBreakdown {
    fn bump(&mut self, kind: TravelKind) {
        match kind {
            TravelKind::Flight => self.flight += 1,
            TravelKind::Hotel => self.hotel += 1,
            TravelKind::Train => self.train += 1,
        }
        self.total += 1;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub total_cost: f64,
    pub avg_work_hours: f64,
    pub holiday_avg_work_hours: f64,
    pub anomaly_count: u64,
    pub total_orders: u64,
    pub order_breakdown: OrderBreakdown,
    pub over_standard_count: u64,
    pub over_standard_breakdown: OrderBreakdown,
    pub flight_over_type_breakdown: BTreeMap<String, u64>,
    pub total_project_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub code: String,
    pub name: Option<String>,
    pub total_cost: f64,
    pub flight_cost: f64,
    pub hotel_cost: f64,
    pub train_cost: f64,
    pub record_count: u64,
    pub flight_count: u64,
    pub hotel_count: u64,
    pub train_count: u64,
    pub person_count: u64,
    pub person_list: Vec<String>,
    pub department_list: Vec<Vec<String>>,
    pub date_range: DateRange,
    pub over_standard_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectOrder {
    pub id: String,
    pub project_code: String,
    pub project_name: Option<String>,
    pub traveller_name: String,
    pub department_path: Vec<String>,
    pub kind: TravelKind,
    pub amount: f64,
    pub event_date: chrono::NaiveDate,
    pub is_over_standard: bool,
    pub over_standard_reason: String,
    pub advance_days: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepartmentHierarchy {
    pub level1: Vec<String>,
    pub level2: BTreeMap<String, Vec<String>>,
    pub level3: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentStat {
    pub name: String,
    pub level: u8,
    pub parent: Option<String>,
    pub person_count: u64,
    pub total_cost: f64,
    pub avg_work_hours: f64,
    pub holiday_avg_work_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedEmployee {
    pub employee_name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentDetails {
    pub status_counts: BTreeMap<AttendanceStatus, u64>,
    pub weekend_work_days: u64,
    pub workday_attendance_days: u64,
    pub travel_days: u64,
    pub leave_days: u64,
    pub anomaly_days: u64,
    pub late_after_1930_count: u64,
    pub weekend_attendance_count: u64,
    pub travel_ranking: Vec<RankedEmployee>,
    pub anomaly_ranking: Vec<RankedEmployee>,
    pub latest_checkout_ranking: Vec<RankedEmployee>,
    pub longest_hours_ranking: Vec<RankedEmployee>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyView {
    pub date: chrono::NaiveDate,
    pub employee_name: String,
    pub department_path: Vec<String>,
    pub kind: AnomalyKind,
    pub attendance_status: Option<AttendanceStatus>,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyTrend {
    pub month: YearMonth,
    pub total_cost: f64,
    pub order_count: u64,
    pub anomaly_count: u64,
    pub avg_work_hours: f64,
}

const LATE_CHECKOUT_THRESHOLD: NaiveTime = match NaiveTime::from_hms_opt(19, 30, 0) {
    Some(t) => t,
    None => unreachable!(),
};

pub struct Aggregator<'s> {
    store: &'s Store,
}

impl<'s> Aggregator<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    fn rows(&self, months: &BTreeSet<YearMonth>, kinds: RowKinds) -> EngineResult<RowSet> {
        if months.is_empty() {
            return Err(EngineError::Internal(anyhow::anyhow!(
                "aggregator called with an empty months set"
            )));
        }
        let mut set = self.store.read_rows(months, kinds)?;
        set.attendance
            .sort_by(|a, b| (a.source_month, a.date, &a.employee_name).cmp(&(b.source_month, b.date, &b.employee_name)));
        set.travel
            .sort_by(|a, b| (a.source_month, a.event_date, &a.id).cmp(&(b.source_month, b.event_date, &b.id)));
        set.anomaly
            .sort_by(|a, b| (a.source_month, a.date, &a.employee_name).cmp(&(b.source_month, b.date, &b.employee_name)));
        Ok(set)
    }

    pub fn summary(&self, months: &BTreeSet<YearMonth>) -> EngineResult<Summary> {
        let rows = self.rows(months, RowKinds::all())?;

        let total_cost: f64 = rows.travel.iter().map(|t| t.amount).sum();

        let work_hours: Vec<f64> = rows
            .attendance
            .iter()
            .filter(|a| a.status == AttendanceStatus::Work && a.work_hours > 0.0)
            .map(|a| a.work_hours)
            .collect();
        let avg_work_hours = mean(&work_hours);

        let holiday_hours: Vec<f64> = rows
            .attendance
            .iter()
            .filter(|a| a.status == AttendanceStatus::WeekendWork && a.work_hours > 0.0)
            .map(|a| a.work_hours)
            .collect();
        let holiday_avg_work_hours = mean(&holiday_hours);

        let mut order_breakdown = OrderBreakdown::default();
        let mut over_standard_breakdown = OrderBreakdown::default();
        let mut flight_over_type_breakdown: BTreeMap<String, u64> = BTreeMap::new();
        for t in &rows.travel {
            order_breakdown.bump(t.kind);
            if t.is_over_standard {
                over_standard_breakdown.bump(t.kind);
                if t.kind == TravelKind::Flight {
                    *flight_over_type_breakdown
                        .entry(t.over_standard_reason.clone())
                        .or_insert(0) += 1;
                }
            }
        }

        let project_codes: std::collections::HashSet<&str> = rows
            .travel
            .iter()
            .map(|t| t.project_code.as_deref().unwrap_or(UNKNOWN_PROJECT_CODE))
            .collect();

        Ok(Summary {
            total_cost,
            avg_work_hours,
            holiday_avg_work_hours,
            anomaly_count: rows.anomaly.len() as u64,
            total_orders: order_breakdown.total,
            order_breakdown,
            over_standard_count: over_standard_breakdown.total,
            over_standard_breakdown,
            flight_over_type_breakdown,
            total_project_count: project_codes.len() as u64,
        })
    }

    pub fn list_projects(&self, months: &BTreeSet<YearMonth>) -> EngineResult<Vec<ProjectSummary>> {
        let rows = self.rows(months, RowKinds { travel: true, ..Default::default() })?;
        Ok(build_project_summaries(&rows.travel))
    }

    pub fn project_top_n(&self, months: &BTreeSet<YearMonth>, n: usize) -> EngineResult<Vec<ProjectSummary>> {
        let mut projects = self.list_projects(months)?;
        projects.sort_by(|a, b| b.total_cost.partial_cmp(&a.total_cost).unwrap());

        if projects.len() <= n {
            return Ok(projects);
        }

        let tail = projects.split_off(n);
        if !tail.is_empty() {
            let mut others = ProjectSummary {
                code: "其他".to_string(),
                name: Some("其他".to_string()),
                total_cost: 0.0,
                flight_cost: 0.0,
                hotel_cost: 0.0,
                train_cost: 0.0,
                record_count: 0,
                flight_count: 0,
                hotel_count: 0,
                train_count: 0,
                person_count: 0,
                person_list: Vec::new(),
                department_list: Vec::new(),
                date_range: DateRange {
                    start: tail[0].date_range.start,
                    end: tail[0].date_range.end,
                },
                over_standard_count: 0,
            };
            let mut persons: BTreeSet<String> = BTreeSet::new();
            let mut departments: BTreeSet<Vec<String>> = BTreeSet::new();
            for p in &tail {
                others.total_cost += p.total_cost;
                others.flight_cost += p.flight_cost;
                others.hotel_cost += p.hotel_cost;
                others.train_cost += p.train_cost;
                others.record_count += p.record_count;
                others.flight_count += p.flight_count;
                others.hotel_count += p.hotel_count;
                others.train_count += p.train_count;
                others.over_standard_count += p.over_standard_count;
                if p.date_range.start < others.date_range.start {
                    others.date_range.start = p.date_range.start;
                }
                if p.date_range.end > others.date_range.end {
                    others.date_range.end = p.date_range.end;
                }
                persons.extend(p.person_list.iter().cloned());
                departments.extend(p.department_list.iter().cloned());
            }
            others.person_count = persons.len() as u64;
            others.person_list = persons.into_iter().collect();
            others.department_list = departments.into_iter().collect();
            projects.push(others);
        }

        Ok(projects)
    }

    pub fn project_orders(&self, months: &BTreeSet<YearMonth>, code: &str) -> EngineResult<Vec<ProjectOrder>> {
        let rows = self.rows(months, RowKinds { travel: true, ..Default::default() })?;
        let orders = rows
            .travel
            .iter()
            .filter(|t| t.project_code_label() == code)
            .map(|t| ProjectOrder {
                id: t.id.clone(),
                project_code: t.project_code_label().to_string(),
                project_name: t.project_name.clone(),
                traveller_name: t.traveller_name.clone(),
                department_path: t.department_path.clone(),
                kind: t.kind,
                amount: t.amount,
                event_date: t.event_date,
                is_over_standard: t.is_over_standard,
                over_standard_reason: t.over_standard_reason.clone(),
                advance_days: t.advance_days,
            })
            .collect();
        Ok(orders)
    }

    pub fn department_hierarchy(&self, months: &BTreeSet<YearMonth>) -> EngineResult<DepartmentHierarchy> {
        let rows = self.rows(months, RowKinds { attendance: true, travel: true, ..Default::default() })?;
        let mut hierarchy = DepartmentHierarchy::default();
        let mut l1_seen: BTreeSet<String> = BTreeSet::new();
        let mut l2_seen: BTreeSet<(String, String)> = BTreeSet::new();
        let mut l3_seen: BTreeSet<(String, String, String)> = BTreeSet::new();

        let all_paths = rows
            .attendance
            .iter()
            .map(|a| &a.department_path)
            .chain(rows.travel.iter().map(|t| &t.department_path));

        for path in all_paths {
            let l1 = path_at(path, 0);
            l1_seen.insert(l1.clone());
            if let Some(l2) = path.get(1) {
                if l2_seen.insert((l1.clone(), l2.clone())) {
                    hierarchy
                        .level2
                        .entry(l1.clone())
                        .or_default()
                        .push(l2.clone());
                }
                if let Some(l3) = path.get(2) {
                    let key = (l1.clone(), l2.clone());
                    let l2_label = level_label(&[l1.clone(), l2.clone()]);
                    if l3_seen.insert((key.0, key.1, l3.clone())) {
                        hierarchy
                            .level3
                            .entry(l2_label)
                            .or_default()
                            .push(l3.clone());
                    }
                }
            }
        }

        hierarchy.level1 = l1_seen.into_iter().collect();
        for v in hierarchy.level2.values_mut() {
            v.sort();
        }
        for v in hierarchy.level3.values_mut() {
            v.sort();
        }
        Ok(hierarchy)
    }

    pub fn department_list(
        &self,
        months: &BTreeSet<YearMonth>,
        level: u8,
        parent: Option<&str>,
    ) -> EngineResult<Vec<DepartmentStat>> {
        let rows = self.rows(months, RowKinds::all())?;
        let groups = group_by_department(&rows, level, parent);

        let mut stats: Vec<DepartmentStat> = groups
            .into_iter()
            .map(|(name, g)| DepartmentStat {
                name,
                level,
                parent: parent.map(|p| p.to_string()),
                person_count: g.person_count(),
                total_cost: g.total_cost(),
                avg_work_hours: mean(&g.work_hours),
                holiday_avg_work_hours: mean(&g.holiday_hours),
            })
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(stats)
    }

    pub fn department_details(
        &self,
        months: &BTreeSet<YearMonth>,
        name: &str,
        level: u8,
    ) -> EngineResult<DepartmentDetails> {
        let rows = self.rows(months, RowKinds::all())?;
        Ok(department_details_for(&rows, name, level))
    }

    pub fn level1_statistics(
        &self,
        months: &BTreeSet<YearMonth>,
        l1_name: &str,
    ) -> EngineResult<(DepartmentDetails, Vec<(String, DepartmentDetails)>)> {
        let rows = self.rows(months, RowKinds::all())?;
        let own = department_details_for(&rows, l1_name, 1);

        let mut children: BTreeSet<String> = BTreeSet::new();
        for path in all_paths(&rows) {
            if path_at(path, 0) == l1_name {
                if let Some(l2) = path.get(1) {
                    children.insert(l2.clone());
                }
            }
        }
        let per_child = children
            .into_iter()
            .map(|name| {
                let label = level_label(&[l1_name.to_string(), name.clone()]);
                let details = department_details_for(&rows, &label, 2);
                (name, details)
            })
            .collect();

        Ok((own, per_child))
    }

    pub fn level2_statistics(
        &self,
        months: &BTreeSet<YearMonth>,
        l2_name: &str,
    ) -> EngineResult<(DepartmentDetails, Vec<(String, DepartmentDetails)>)> {
        let rows = self.rows(months, RowKinds::all())?;
        let own = department_details_for(&rows, l2_name, 2);

        let mut children: BTreeSet<(Vec<String>, String)> = BTreeSet::new();
        for path in all_paths(&rows) {
            if path.len() >= 2 && level_label(&path[..2]) == l2_name {
                if let Some(l3) = path.get(2) {
                    children.insert((path[..2].to_vec(), l3.clone()));
                }
            }
        }
        let per_child = children
            .into_iter()
            .map(|(prefix, name)| {
                let mut full = prefix;
                full.push(name.clone());
                let label = level_label(&full);
                let details = department_details_for(&rows, &label, 3);
                (name, details)
            })
            .collect();

        Ok((own, per_child))
    }

    pub fn list_anomalies(&self, months: &BTreeSet<YearMonth>) -> EngineResult<Vec<AnomalyView>> {
        let rows = self.rows(months, RowKinds { anomaly: true, ..Default::default() })?;
        Ok(rows
            .anomaly
            .iter()
            .map(|a| AnomalyView {
                date: a.date,
                employee_name: a.employee_name.clone(),
                department_path: a.department_path.clone(),
                kind: a.kind,
                attendance_status: a.attendance_status,
                detail: a.detail.clone(),
            })
            .collect())
    }

    pub fn monthly_trend(&self, months: &BTreeSet<YearMonth>) -> EngineResult<Vec<MonthlyTrend>> {
        let known: BTreeSet<YearMonth> = self.store.list_months()?.into_iter().collect();
        let mut out = Vec::new();
        for month in months {
            if !known.contains(month) {
                continue;
            }
            let single = BTreeSet::from([*month]);
            let summary = self.summary(&single)?;
            out.push(MonthlyTrend {
                month: *month,
                total_cost: summary.total_cost,
                order_count: summary.total_orders,
                anomaly_count: summary.anomaly_count,
                avg_work_hours: summary.avg_work_hours,
            });
        }
        out.sort_by_key(|t| t.month);
        Ok(out)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn path_at(path: &[String], idx: usize) -> String {
    path.get(idx).cloned().unwrap_or_else(|| "未知".to_string())
}

fn level_label(path: &[String]) -> String {
    path.join(" / ")
}

fn all_paths(rows: &RowSet) -> impl Iterator<Item = &Vec<String>> {
    rows.attendance
        .iter()
        .map(|a| &a.department_path)
        .chain(rows.travel.iter().map(|t| &t.department_path))
}

fn department_key(path: &[String], level: u8) -> Option<String> {
    let take = level as usize;
    if path.len() < take || take == 0 {
        return None;
    }
    Some(level_label(&path[..take]))
}

struct DeptGroup<'a> {
    travellers: BTreeSet<&'a str>,
    employees: BTreeSet<&'a str>,
    cost: f64,
    work_hours: Vec<f64>,
    holiday_hours: Vec<f64>,
}

impl<'a> DeptGroup<'a> {
    fn new() -> Self {
        Self {
            travellers: BTreeSet::new(),
            employees: BTreeSet::new(),
            cost: 0.0,
            work_hours: Vec::new(),
            holiday_hours: Vec::new(),
        }
    }

    fn person_count(&self) -> u64 {
        let mut all: BTreeSet<&str> = BTreeSet::new();
        all.extend(self.travellers.iter());
        all.extend(self.employees.iter());
        all.len() as u64
    }

    fn total_cost(&self) -> f64 {
        self.cost
    }
}

fn group_by_department<'a>(
    rows: &'a RowSet,
    level: u8,
    parent: Option<&str>,
) -> HashMap<String, DeptGroup<'a>> {
    let mut groups: HashMap<String, DeptGroup<'a>> = HashMap::new();

    for t in &rows.travel {
        let Some(key) = department_key(&t.department_path, level) else { continue };
        if let Some(p) = parent {
            if !key.starts_with(p) || (key.len() > p.len() && !key[p.len()..].starts_with(" / ")) {
                continue;
            }
        }
        let g = groups.entry(key).or_insert_with(DeptGroup::new);
        g.travellers.insert(t.traveller_name.as_str());
        g.cost += t.amount;
    }

    for a in &rows.attendance {
        let Some(key) = department_key(&a.department_path, level) else { continue };
        if let Some(p) = parent {
            if !key.starts_with(p) || (key.len() > p.len() && !key[p.len()..].starts_with(" / ")) {
                continue;
            }
        }
        let g = groups.entry(key).or_insert_with(DeptGroup::new);
        g.employees.insert(a.employee_name.as_str());
        match a.status {
            AttendanceStatus::Work if a.work_hours > 0.0 => g.work_hours.push(a.work_hours),
            AttendanceStatus::WeekendWork if a.work_hours > 0.0 => g.holiday_hours.push(a.work_hours),
            _ => {}
        }
    }

    groups
}

fn department_details_for(rows: &RowSet, name: &str, level: u8) -> DepartmentDetails {
    let mut status_counts: BTreeMap<AttendanceStatus, u64> = BTreeMap::new();
    let mut weekend_work_days = 0u64;
    let mut workday_attendance_days = 0u64;
    let mut travel_days = 0u64;
    let mut leave_days = 0u64;
    let mut late_after_1930_count = 0u64;
    let mut weekend_attendance_count = 0u64;

    let mut travel_person_days: HashMap<String, u64> = HashMap::new();
    let mut work_hours_by_person: HashMap<String, Vec<f64>> = HashMap::new();
    let mut latest_checkout_by_person: HashMap<String, NaiveTime> = HashMap::new();

    for a in &rows.attendance {
        if department_key(&a.department_path, level).as_deref() != Some(name) {
            continue;
        }
        *status_counts.entry(a.status).or_insert(0) += 1;
        match a.status {
            AttendanceStatus::WeekendWork => {
                weekend_work_days += 1;
                weekend_attendance_count += 1;
                work_hours_by_person
                    .entry(a.employee_name.clone())
                    .or_default();
            }
            AttendanceStatus::Work => {
                workday_attendance_days += 1;
                if a.work_hours > 0.0 {
                    work_hours_by_person
                        .entry(a.employee_name.clone())
                        .or_default()
                        .push(a.work_hours);
                }
            }
            AttendanceStatus::Travel => {
                travel_days += 1;
                *travel_person_days.entry(a.employee_name.clone()).or_insert(0) += 1;
            }
            AttendanceStatus::Leave => leave_days += 1,
            AttendanceStatus::Unknown => {}
        }
        if let Some(checkout) = a.checkout_time {
            if checkout > LATE_CHECKOUT_THRESHOLD {
                late_after_1930_count += 1;
            }
            latest_checkout_by_person
                .entry(a.employee_name.clone())
                .and_modify(|t| {
                    if checkout > *t {
                        *t = checkout;
                    }
                })
                .or_insert(checkout);
        }
    }

    let mut anomaly_person_days: HashMap<String, u64> = HashMap::new();
    for an in &rows.anomaly {
        if department_key(&an.department_path, level).as_deref() != Some(name) {
            continue;
        }
        *anomaly_person_days.entry(an.employee_name.clone()).or_insert(0) += 1;
    }
    let anomaly_days: u64 = anomaly_person_days.values().sum();

    let travel_ranking = top_ranked(travel_person_days.into_iter().map(|(k, v)| (k, v as f64)));
    let anomaly_ranking = top_ranked(anomaly_person_days.into_iter().map(|(k, v)| (k, v as f64)));
    let latest_checkout_ranking = top_ranked(
        latest_checkout_by_person
            .into_iter()
            .map(|(k, t)| (k, time_to_minutes(t))),
    );
    let longest_hours_ranking = top_ranked(
        work_hours_by_person
            .into_iter()
            .filter(|(_, hours)| !hours.is_empty())
            .map(|(k, hours)| (k, mean(&hours))),
    );

    DepartmentDetails {
        status_counts,
        weekend_work_days,
        workday_attendance_days,
        travel_days,
        leave_days,
        anomaly_days,
        late_after_1930_count,
        weekend_attendance_count,
        travel_ranking,
        anomaly_ranking,
        latest_checkout_ranking,
        longest_hours_ranking,
    }
}

fn time_to_minutes(t: NaiveTime) -> f64 {
    use chrono::Timelike;
    (t.hour() * 60 + t.minute()) as f64
}

fn top_ranked(values: impl Iterator<Item = (String, f64)>) -> Vec<RankedEmployee> {
    let mut v: Vec<RankedEmployee> = values
        .map(|(employee_name, value)| RankedEmployee { employee_name, value })
        .collect();
    v.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap()
            .then_with(|| a.employee_name.cmp(&b.employee_name))
    });
    v.truncate(10);
    v
}

fn build_project_summaries(travel: &[TravelRow]) -> Vec<ProjectSummary> {
    struct Acc {
        name_counts: HashMap<String, u64>,
        first_seen_order: Vec<String>,
        total_cost: f64,
        flight_cost: f64,
        hotel_cost: f64,
        train_cost: f64,
        record_count: u64,
        flight_count: u64,
        hotel_count: u64,
        train_count: u64,
        persons: BTreeSet<String>,
        departments: BTreeSet<Vec<String>>,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
        over_standard_count: u64,
    }

    let mut by_code: BTreeMap<String, Acc> = BTreeMap::new();

    for t in travel {
        let code = t.project_code_label().to_string();
        let acc = by_code.entry(code).or_insert_with(|| Acc {
            name_counts: HashMap::new(),
            first_seen_order: Vec::new(),
            total_cost: 0.0,
            flight_cost: 0.0,
            hotel_cost: 0.0,
            train_cost: 0.0,
            record_count: 0,
            flight_count: 0,
            hotel_count: 0,
            train_count: 0,
            persons: BTreeSet::new(),
            departments: BTreeSet::new(),
            start: t.event_date,
            end: t.event_date,
            over_standard_count: 0,
        });

        if let Some(name) = &t.project_name {
            if !acc.name_counts.contains_key(name) {
                acc.first_seen_order.push(name.clone());
            }
            *acc.name_counts.entry(name.clone()).or_insert(0) += 1;
        }

        acc.total_cost += t.amount;
        match t.kind {
            TravelKind::Flight => {
                acc.flight_cost += t.amount;
                acc.flight_count += 1;
            }
            TravelKind::Hotel => {
                acc.hotel_cost += t.amount;
                acc.hotel_count += 1;
            }
            TravelKind::Train => {
                acc.train_cost += t.amount;
                acc.train_count += 1;
            }
        }
        acc.record_count += 1;
        acc.persons.insert(t.traveller_name.clone());
        acc.departments.insert(t.department_path.clone());
        if t.event_date < acc.start {
            acc.start = t.event_date;
        }
        if t.event_date > acc.end {
            acc.end = t.event_date;
        }
        if t.is_over_standard {
            acc.over_standard_count += 1;
        }
    }

    by_code
        .into_iter()
        .map(|(code, acc)| {
            let name = acc
                .first_seen_order
                .iter()
                .max_by_key(|n| acc.name_counts[*n])
                .cloned();
            ProjectSummary {
                code,
                name,
                total_cost: acc.total_cost,
                flight_cost: acc.flight_cost,
                hotel_cost: acc.hotel_cost,
                train_cost: acc.train_cost,
                record_count: acc.record_count,
                flight_count: acc.flight_count,
                hotel_count: acc.hotel_count,
                train_count: acc.train_count,
                person_count: acc.persons.len() as u64,
                person_list: acc.persons.into_iter().collect(),
                department_list: acc.departments.into_iter().collect(),
                date_range: DateRange { start: acc.start, end: acc.end },
                over_standard_count: acc.over_standard_count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attendance::AttendanceRow;
    use crate::models::travel::TravelRow;
    use chrono::NaiveDate;

    fn travel(month: &str, day: u32, dept: &[&str], amount: f64, traveller: &str) -> TravelRow {
        let month: YearMonth = month.parse().unwrap();
        TravelRow {
            id: uuid::Uuid::new_v4().to_string(),
            kind: TravelKind::Flight,
            event_date: NaiveDate::from_ymd_opt(month.year, month.month, day).unwrap(),
            booker_name: traveller.to_string(),
            traveller_name: traveller.to_string(),
            department_path: dept.iter().map(|s| s.to_string()).collect(),
            amount,
            project_code: None,
            project_name: None,
            advance_days: 0,
            is_over_standard: false,
            over_standard_reason: String::new(),
            source_month: month,
        }
    }

    fn attendance(month: &str, day: u32, name: &str, status: AttendanceStatus, hours: f64) -> AttendanceRow {
        let month: YearMonth = month.parse().unwrap();
        AttendanceRow {
            date: NaiveDate::from_ymd_opt(month.year, month.month, day).unwrap(),
            employee_name: name.to_string(),
            department_path: vec!["研发".to_string()],
            status,
            work_hours: hours,
            checkout_time: None,
            source_month: month,
        }
    }

    fn store_with(attendance: Vec<AttendanceRow>, travel: Vec<TravelRow>) -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("engine.db")).unwrap();
        let mut by_month: BTreeMap<YearMonth, (Vec<AttendanceRow>, Vec<TravelRow>)> = BTreeMap::new();
        for a in attendance {
            by_month.entry(a.source_month).or_default().0.push(a);
        }
        for t in travel {
            by_month.entry(t.source_month).or_default().1.push(t);
        }
        for (month, (a, t)) in by_month {
            store.replace_month(month, &a, &t, &[]).unwrap();
        }
        (store, dir)
    }

    #[test]
    fn money_parsing_sums_correctly() {
        let (store, _dir) = store_with(
            vec![],
            vec![
                { let mut t = travel("2025-08", 1, &["研发"], 1234.56, "A"); t.project_code = None; t },
                { let mut t = travel("2025-08", 2, &["研发"], 2000.0, "B"); t.project_code = None; t },
            ],
        );
        let agg = Aggregator::new(&store);
        let months = BTreeSet::from(["2025-08".parse().unwrap()]);
        let summary = agg.summary(&months).unwrap();
        assert!((summary.total_cost - 3234.56).abs() < 1e-6);
    }

    #[test]
    fn department_aggregation_level2() {
        let (store, _dir) = store_with(
            vec![],
            vec![
                travel("2025-08", 1, &["研发", "算法", "NLP"], 1000.0, "张三"),
                travel("2025-08", 2, &["研发", "算法", "CV"], 1000.0, "李四"),
            ],
        );
        let agg = Aggregator::new(&store);
        let months = BTreeSet::from(["2025-08".parse().unwrap()]);
        let list = agg.department_list(&months, 2, Some("研发")).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "研发 / 算法");
        assert!((list[0].total_cost - 2000.0).abs() < 1e-6);
        assert_eq!(list[0].person_count, 2);
    }

    #[test]
    fn multi_month_summary_sums_across_months() {
        let (store, _dir) = store_with(
            vec![],
            vec![
                travel("2025-01", 1, &["研发"], 1000.0, "A"),
                travel("2025-02", 1, &["研发"], 2000.0, "B"),
            ],
        );
        let agg = Aggregator::new(&store);
        let months: BTreeSet<YearMonth> = ["2025-01".parse().unwrap(), "2025-02".parse().unwrap()]
            .into_iter()
            .collect();
        let summary = agg.summary(&months).unwrap();
        assert!((summary.total_cost - 3000.0).abs() < 1e-6);
        let mut list_months = store.list_months().unwrap();
        list_months.sort();
        assert_eq!(list_months, vec!["2025-01".parse().unwrap(), "2025-02".parse().unwrap()]);
    }

    #[test]
    fn empty_months_set_is_internal_error() {
        let (store, _dir) = store_with(vec![], vec![]);
        let agg = Aggregator::new(&store);
        let months = BTreeSet::new();
        assert!(agg.summary(&months).is_err());
    }

    #[test]
    fn avg_work_hours_restricted_to_positive_work_status() {
        let (store, _dir) = store_with(
            vec![
                attendance("2025-08", 1, "A", AttendanceStatus::Work, 8.0),
                attendance("2025-08", 2, "B", AttendanceStatus::Work, 0.0),
                attendance("2025-08", 3, "C", AttendanceStatus::WeekendWork, 4.0),
            ],
            vec![],
        );
        let agg = Aggregator::new(&store);
        let months = BTreeSet::from(["2025-08".parse().unwrap()]);
        let summary = agg.summary(&months).unwrap();
        assert!((summary.avg_work_hours - 8.0).abs() < 1e-6);
        assert!((summary.holiday_avg_work_hours - 4.0).abs() < 1e-6);
    }
}
