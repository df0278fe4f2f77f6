//! Card assembly for the eligibility hook.

use api_shared::hooks::{Card, CardExtension, CardSource, Coding, Indicator, Suggestion};
use cds_core::criteria::RegistryCriteria;
use cds_core::Evaluation;
use chrono::{DateTime, TimeZone};

const CARD_SUMMARY: &str = "Patient Eligible for SMART Asthma Therapy";
const TOPIC_PREFIX: &str = "SMARTAsthma";
const TOPIC_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Hidden HTML summary of the registry sub-criteria, read by downstream reporting.
pub fn card_detail(registry: &RegistryCriteria) -> String {
    let fields = [
        ("Alive", registry.alive),
        ("Encounter", registry.encounter),
        ("Asthma", registry.asthma),
        ("PersistentAsthma", registry.persistent_asthma),
        ("AsthmaMedication", registry.asthma_medication),
        ("AsthmaEncounterDiagnosis", registry.asthma_encounter_diagnosis),
        ("Evaluation", registry.evaluation),
    ];
    let body = fields
        .iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect::<Vec<_>>()
        .join("; ");

    format!("<p hidden>{body}</p>")
}

/// Build the recommendation card for an eligible patient.
///
/// # Arguments
/// * `evaluation` - A completed evaluation that recommends treatment.
/// * `order_set_key` - Order set offered by the suggestion.
/// * `card_uuid` - Identifier for this card instance.
/// * `now` - Time stamped into the source topic code.
pub fn eligibility_card<Tz: TimeZone>(
    evaluation: &Evaluation,
    order_set_key: &str,
    card_uuid: String,
    now: DateTime<Tz>,
) -> Card
where
    Tz::Offset: std::fmt::Display,
{
    Card {
        uuid: card_uuid,
        summary: CARD_SUMMARY.into(),
        detail: card_detail(&evaluation.criteria.registry),
        indicator: Indicator::Info,
        source: CardSource {
            label: String::new(),
            url: None,
            topic: Some(Coding {
                code: format!("{TOPIC_PREFIX}{}", now.format(TOPIC_TIME_FORMAT)),
                ..Coding::default()
            }),
        },
        selection_behavior: None,
        extension: Some(CardExtension {
            detail_content_type: "text/html".into(),
        }),
        links: Vec::new(),
        suggestions: vec![Suggestion::order_set(
            order_set_key,
            &evaluation.context.patient_id,
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_shared::hooks::DETAIL_CONTENT_TYPE_EXTENSION;
    use cds_core::aggregate::{ControlToolScore, PatientContext};
    use cds_core::Criteria;
    use chrono::Utc;

    fn evaluation() -> Evaluation {
        Evaluation {
            criteria: Criteria {
                registry: RegistryCriteria {
                    alive: true,
                    encounter: true,
                    persistent_asthma: true,
                    evaluation: true,
                    ..RegistryCriteria::default()
                },
                eligible: None,
                initiated: None,
            },
            context: PatientContext::new("p1", Some("e1"), None),
            control_tool: ControlToolScore::default(),
        }
    }

    #[test]
    fn detail_lists_registry_flags_hidden() {
        let detail = card_detail(&evaluation().criteria.registry);
        assert!(detail.starts_with("<p hidden>"));
        assert!(detail.ends_with("</p>"));
        assert!(detail.contains("PersistentAsthma: true"));
        assert!(detail.contains("AsthmaMedication: false"));
    }

    #[test]
    fn card_carries_topic_code_and_order_set() {
        let now = Utc
            .with_ymd_and_hms(2026, 10, 18, 9, 5, 7)
            .single()
            .expect("time");
        let card = eligibility_card(&evaluation(), "OS-1", "card-1".into(), now);

        let value = serde_json::to_value(&card).expect("json");
        assert_eq!(value["summary"], CARD_SUMMARY);
        assert_eq!(value["indicator"], "info");
        assert_eq!(value["source"]["topic"]["code"], "SMARTAsthma20261018090507");
        assert_eq!(value["extension"][DETAIL_CONTENT_TYPE_EXTENSION], "text/html");
        assert_eq!(
            value["suggestions"][0]["actions"][0]["resource"]["subject"]["reference"],
            "Patient/p1"
        );
    }
}
