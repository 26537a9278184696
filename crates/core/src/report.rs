//! Report assembly.
//!
//! Turns a resolved patient record into the final report artifact: builds
//! the placeholder field map (including derived fields like age), renders
//! the template, and packages the result with a fresh report id and issue
//! timestamp. Resolver failures surface as structured errors, never a
//! partially filled report, while template failures degrade to a fixed
//! message, because a report with patient data and no narrative is still
//! useful.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use report_types::PatientId;
use serde::Serialize;

use crate::breaker::CircuitBreaker;
use crate::cache::PatientCache;
use crate::config::{CoreConfig, TemplateLocation};
use crate::error::{ReportError, ReportResult};
use crate::patient::PatientRecord;
use crate::resolver::{ResilientResolver, SourceBinding};
use crate::source::HttpPatientSource;
use crate::template::{self, FieldMap, TemplateStore, NOT_SPECIFIED};

/// A generated patient report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Freshly generated unique report id.
    pub report_id: String,
    /// When the report was issued.
    pub issue_date: DateTime<Utc>,
    /// Rendered narrative text.
    pub generated_report: String,
    pub patient_id: String,
    pub patient_name: String,
    pub email: String,
}

/// Orchestrates resolution, rendering and assembly for one process.
pub struct ReportService {
    resolver: ResilientResolver,
    cache: Arc<PatientCache>,
    template_store: TemplateStore,
}

impl ReportService {
    pub fn new(
        resolver: ResilientResolver,
        cache: Arc<PatientCache>,
        template_store: TemplateStore,
    ) -> Self {
        Self {
            resolver,
            cache,
            template_store,
        }
    }

    /// Wires a service from startup configuration: HTTP sources with their
    /// breakers and deadlines, a fresh cache, and the configured template
    /// store.
    pub fn from_config(cfg: Arc<CoreConfig>) -> ReportResult<Self> {
        let cache = Arc::new(PatientCache::new());

        let primary = HttpPatientSource::new(
            "patient-service",
            cfg.primary_base_url(),
            cfg.retry(),
        )
        .map_err(|e| ReportError::InvalidInput(e.to_string()))?;
        let primary = SourceBinding::new(
            Arc::new(primary),
            CircuitBreaker::new(
                "patient-service",
                cfg.breaker_failure_threshold(),
                cfg.breaker_cool_down(),
            ),
            cfg.primary_deadline(),
        );

        let fallback = match cfg.fallback_base_url() {
            Some(url) => {
                let source =
                    HttpPatientSource::new("patient-service-direct", url, cfg.retry())
                        .map_err(|e| ReportError::InvalidInput(e.to_string()))?;
                Some(SourceBinding::new(
                    Arc::new(source),
                    CircuitBreaker::new(
                        "patient-service-direct",
                        cfg.breaker_failure_threshold(),
                        cfg.breaker_cool_down(),
                    ),
                    cfg.fallback_deadline(),
                ))
            }
            None => None,
        };

        let template_store = match cfg.template_location() {
            TemplateLocation::File(path) => TemplateStore::file(path.clone()),
            TemplateLocation::Remote(url) => TemplateStore::remote(url.clone()),
        };

        Ok(Self::new(
            ResilientResolver::new(cache.clone(), primary, fallback),
            cache,
            template_store,
        ))
    }

    /// Generates a report for the given patient id.
    pub async fn make_report(&self, id: &PatientId) -> ReportResult<Report> {
        let record = self.resolver.resolve(id).await?;

        let template_text = match self.template_store.read_template().await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "template unavailable, degrading to fixed message");
                String::new()
            }
        };

        let fields = build_field_map(&record);
        let generated_report = template::render(&template_text, &fields);

        let report = Report {
            report_id: uuid::Uuid::new_v4().to_string(),
            issue_date: Utc::now(),
            generated_report,
            patient_id: record.id.clone(),
            patient_name: full_name(&record),
            email: record
                .email
                .clone()
                .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
        };
        tracing::info!(patient_id = %id, report_id = %report.report_id, "report generated");
        Ok(report)
    }

    /// Administrative cache-busting: drops the cached record for an id so
    /// the next request re-fetches it. Returns whether an entry existed.
    pub fn invalidate_cached_patient(&self, id: &PatientId) -> bool {
        self.cache.invalidate(id.as_str())
    }

    /// Resolver backing this service (breaker state is observable).
    pub fn resolver(&self) -> &ResilientResolver {
        &self.resolver
    }
}

fn full_name(record: &PatientRecord) -> String {
    let first = record.first_name.as_deref().unwrap_or(NOT_SPECIFIED);
    let last = record.last_name.as_deref().unwrap_or(NOT_SPECIFIED);
    format!("{first} {last}")
}

/// Builds the placeholder map for one record. Every field is registered
/// under its canonical key plus the variant closure; missing values map to
/// the sentinel so every declared placeholder resolves to some text.
pub fn build_field_map(record: &PatientRecord) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("id", Some(record.id.clone()));
    // Templates address the first name both ways.
    fields.insert("name", record.first_name.clone());
    fields.insert("firstName", record.first_name.clone());
    fields.insert("lastName", record.last_name.clone());
    fields.insert("birthDate", record.birth_date.clone());
    fields.insert(
        "age",
        compute_age(record.birth_date.as_deref(), Utc::now().date_naive()),
    );
    fields.insert("gender", record.gender.clone());
    fields.insert("bloodType", record.blood_type.clone());
    fields.insert("phone", record.phone.clone());
    fields.insert("email", record.email.clone());
    fields.insert("address", record.address.clone());
    fields.insert("city", record.city.clone());
    fields.insert("country", record.country.clone());
    fields.insert("postalCode", record.postal_code.clone());
    fields.insert("emergencyContactName", record.emergency_contact_name.clone());
    fields.insert("emergencyContactPhone", record.emergency_contact_phone.clone());
    fields.insert("emergencyContactName2", record.emergency_contact_name2.clone());
    fields.insert("emergencyContactPhone2", record.emergency_contact_phone2.clone());
    fields.insert("emergencyContactName3", record.emergency_contact_name3.clone());
    fields.insert("emergencyContactPhone3", record.emergency_contact_phone3.clone());
    fields.insert("medicalHistory", record.medical_history.clone());
    fields.insert("allergies", record.allergies.clone());
    fields.insert("insuranceProvider", record.insurance_provider.clone());
    fields.insert("insuranceNumber", record.insurance_number.clone());
    fields.insert("registrationDate", record.registration_date.clone());
    fields.insert("updatedAt", record.updated_at.clone());
    fields.insert("status", record.status.map(|b| b.to_string()));
    fields.insert("active", record.active.map(|b| b.to_string()));
    fields
}

/// Whole years between the birth date and `today`. The upstream birth date
/// sometimes carries a time part (`1990-01-15T00:00:00`); only the date
/// part is parsed. Any unparseable value yields `None`, which the field
/// map turns into the sentinel.
fn compute_age(birth_date: Option<&str>, today: NaiveDate) -> Option<String> {
    let raw = birth_date?.trim();
    let date_part = raw.split('T').next()?;
    let parsed = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;

    let mut age = today.year() - parsed.year();
    if (today.month(), today.day()) < (parsed.month(), parsed.day()) {
        age -= 1;
    }
    if age < 0 {
        return None;
    }
    Some(age.to_string())
}
