//! Subject resolver — maps a bulletin's subject description to tracked
//! parties.
//!
//! Matching is a strict fallback chain: the first stage that returns a
//! non-empty set wins and later stages are never evaluated. An empty result
//! is a terminal "subject not found" signal, distinct from a processing
//! error — the caller discards such bulletins.

use tracing::debug;

use crate::error::DatabaseError;
use crate::model::{CompanyDescription, JuridicalStatus, Party, PersonDescription, SubjectDescription};
use crate::store::Database;

/// Statuses a company description may resolve to.
const COMPANY_STATUSES: &[JuridicalStatus] =
    &[JuridicalStatus::Company, JuridicalStatus::SoleProprietor];

const PERSON_STATUSES: &[JuridicalStatus] = &[JuridicalStatus::Person];

/// Resolves subject descriptions against the case-management store.
pub struct SubjectResolver<'a> {
    db: &'a dyn Database,
}

impl<'a> SubjectResolver<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }

    /// Resolve a description to candidate parties.
    ///
    /// Empty vector means no party matched at any stage.
    pub async fn resolve(
        &self,
        subject: &SubjectDescription,
    ) -> Result<Vec<Party>, DatabaseError> {
        match subject {
            SubjectDescription::Empty => Ok(Vec::new()),
            SubjectDescription::Company(company) => self.resolve_company(company).await,
            SubjectDescription::Person(person) => self.resolve_person(person).await,
        }
    }

    async fn resolve_company(
        &self,
        company: &CompanyDescription,
    ) -> Result<Vec<Party>, DatabaseError> {
        // Stage 1: exact tax id or registration id.
        let matched = self
            .db
            .find_parties_by_requisites(
                COMPANY_STATUSES,
                company.tax_id.as_deref().filter(|s| !s.is_empty()),
                company.reg_id.as_deref().filter(|s| !s.is_empty()),
            )
            .await?;
        if !matched.is_empty() {
            debug!(count = matched.len(), "Company resolved by requisites");
            return Ok(matched);
        }

        let Some(name) = company.name.as_deref().map(strip_quotes) else {
            return Ok(Vec::new());
        };
        if name.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.db.parties_with_status(COMPANY_STATUSES).await?;

        // Stage 2: normalized full-name containment.
        let matched: Vec<Party> = candidates
            .iter()
            .filter(|p| strip_quotes(&p.full_name).contains(&name))
            .cloned()
            .collect();
        if !matched.is_empty() {
            debug!(count = matched.len(), "Company resolved by full name");
            return Ok(matched);
        }

        // Stage 3: same test against the short name.
        let matched: Vec<Party> = candidates
            .into_iter()
            .filter(|p| strip_quotes(&p.short_name).contains(&name))
            .collect();
        if !matched.is_empty() {
            debug!(count = matched.len(), "Company resolved by short name");
        }
        Ok(matched)
    }

    async fn resolve_person(
        &self,
        person: &PersonDescription,
    ) -> Result<Vec<Party>, DatabaseError> {
        // Stage 1: exact tax id.
        let matched = self
            .db
            .find_parties_by_requisites(
                PERSON_STATUSES,
                person.tax_id.as_deref().filter(|s| !s.is_empty()),
                None,
            )
            .await?;
        if !matched.is_empty() {
            debug!(count = matched.len(), "Person resolved by tax id");
            return Ok(matched);
        }

        let full_name = person
            .name
            .as_ref()
            .map(|n| n.canonical())
            .unwrap_or_default();
        if full_name.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.db.parties_with_status(PERSON_STATUSES).await?;

        // Stage 2: canonical name containment against the full name.
        let matched: Vec<Party> = candidates
            .iter()
            .filter(|p| p.full_name.contains(&full_name))
            .cloned()
            .collect();
        if !matched.is_empty() {
            debug!(count = matched.len(), "Person resolved by full name");
            return Ok(matched);
        }

        // Stage 3: same test against the short name.
        let matched: Vec<Party> = candidates
            .into_iter()
            .filter(|p| p.short_name.contains(&full_name))
            .collect();
        if !matched.is_empty() {
            debug!(count = matched.len(), "Person resolved by short name");
        }
        Ok(matched)
    }
}

/// Strip quote and guillemet characters before containment tests.
fn strip_quotes(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '"' | '«' | '»')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Matter, MatterStatus, PersonName};
    use crate::store::LibSqlBackend;

    fn company_party(id: i64, tax_id: Option<&str>, full_name: &str, short_name: &str) -> Party {
        Party {
            id,
            status: JuridicalStatus::Company,
            tax_id: tax_id.map(String::from),
            reg_id: None,
            full_name: full_name.to_string(),
            short_name: short_name.to_string(),
            matters: vec![Matter {
                id: id * 10,
                party_id: id,
                case_id: id * 100,
                status: MatterStatus::Bankruptcy,
                lead_user_id: None,
                assistant_user_id: None,
                project_id: None,
            }],
        }
    }

    fn person_party(id: i64, tax_id: Option<&str>, full_name: &str, short_name: &str) -> Party {
        Party {
            status: JuridicalStatus::Person,
            ..company_party(id, tax_id, full_name, short_name)
        }
    }

    #[tokio::test]
    async fn company_tax_id_match_short_circuits_name_stages() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.insert_party(&company_party(1, Some("1234567890"), "ООО «Ромашка»", "Ромашка"))
            .await
            .unwrap();
        // Same name, different requisites: would match at stage 2 if it ran.
        db.insert_party(&company_party(2, Some("999"), "ООО «Ромашка»", "Ромашка"))
            .await
            .unwrap();

        let resolver = SubjectResolver::new(&db);
        let matched = resolver
            .resolve(&SubjectDescription::Company(CompanyDescription {
                name: Some("Ромашка".into()),
                tax_id: Some("1234567890".into()),
                ..CompanyDescription::default()
            }))
            .await
            .unwrap();

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, 1);
    }

    #[tokio::test]
    async fn company_falls_back_to_normalized_full_name() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.insert_party(&company_party(
            1,
            Some("111"),
            "Общество с ограниченной ответственностью «Вектор»",
            "Вектор",
        ))
        .await
        .unwrap();

        let resolver = SubjectResolver::new(&db);
        let matched = resolver
            .resolve(&SubjectDescription::Company(CompanyDescription {
                name: Some("ООО \"Вектор\"".into()),
                tax_id: Some("does-not-match".into()),
                ..CompanyDescription::default()
            }))
            .await
            .unwrap();
        // Quotes are stripped on both sides; «Вектор» contains Вектор but the
        // full description "ООО Вектор" does not appear in the stored name.
        assert!(matched.is_empty());

        let matched = resolver
            .resolve(&SubjectDescription::Company(CompanyDescription {
                name: Some("«Вектор»".into()),
                ..CompanyDescription::default()
            }))
            .await
            .unwrap();
        assert_eq!(matched.len(), 1);
    }

    #[tokio::test]
    async fn company_falls_back_to_short_name() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.insert_party(&company_party(3, None, "полное наименование без совпадения", "ПАО «Звезда»"))
            .await
            .unwrap();

        let resolver = SubjectResolver::new(&db);
        let matched = resolver
            .resolve(&SubjectDescription::Company(CompanyDescription {
                name: Some("Звезда".into()),
                ..CompanyDescription::default()
            }))
            .await
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, 3);
    }

    #[tokio::test]
    async fn company_ignores_person_parties() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.insert_party(&person_party(1, Some("1234567890"), "Иванов Иван", "Иванов"))
            .await
            .unwrap();

        let resolver = SubjectResolver::new(&db);
        let matched = resolver
            .resolve(&SubjectDescription::Company(CompanyDescription {
                tax_id: Some("1234567890".into()),
                name: Some("Иванов".into()),
                ..CompanyDescription::default()
            }))
            .await
            .unwrap();
        assert!(matched.is_empty());
    }

    #[tokio::test]
    async fn person_resolves_by_tax_id_then_canonical_name() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.insert_party(&person_party(
            1,
            Some("500100732259"),
            "Иванов Иван Иванович",
            "Иванов И.И.",
        ))
        .await
        .unwrap();

        let resolver = SubjectResolver::new(&db);

        let by_tax = resolver
            .resolve(&SubjectDescription::Person(PersonDescription {
                tax_id: Some("500100732259".into()),
                ..PersonDescription::default()
            }))
            .await
            .unwrap();
        assert_eq!(by_tax.len(), 1);

        let by_name = resolver
            .resolve(&SubjectDescription::Person(PersonDescription {
                name: Some(PersonName {
                    first: Some("Иван".into()),
                    last: Some("Иванов".into()),
                    middle: Some("Иванович".into()),
                }),
                ..PersonDescription::default()
            }))
            .await
            .unwrap();
        assert_eq!(by_name.len(), 1);
    }

    #[tokio::test]
    async fn person_canonical_name_matches_short_name_at_stage_three() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.insert_party(&person_party(
            2,
            None,
            "полное имя в другом написании",
            "должник Иванов Иван Иванович (ИНН отсутствует)",
        ))
        .await
        .unwrap();

        let resolver = SubjectResolver::new(&db);
        let matched = resolver
            .resolve(&SubjectDescription::Person(PersonDescription {
                name: Some(PersonName {
                    first: Some("Иван".into()),
                    last: Some("Иванов".into()),
                    middle: Some("Иванович".into()),
                }),
                ..PersonDescription::default()
            }))
            .await
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, 2);
    }

    #[tokio::test]
    async fn empty_description_resolves_to_nothing() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let resolver = SubjectResolver::new(&db);
        assert!(
            resolver
                .resolve(&SubjectDescription::Empty)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn person_without_name_or_tax_id_resolves_to_nothing() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.insert_party(&person_party(1, None, "Иванов Иван", "Иванов"))
            .await
            .unwrap();

        let resolver = SubjectResolver::new(&db);
        let matched = resolver
            .resolve(&SubjectDescription::Person(PersonDescription::default()))
            .await
            .unwrap();
        assert!(matched.is_empty());
    }
}
