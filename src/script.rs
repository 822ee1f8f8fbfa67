//! Sequence documents
//!
//! Operators write sequences as JSON, either a full document
//!
//! ```json
//! { "name": "ramp", "steps": [
//!     { "kind": "inject", "species": "proton", "count": 200 },
//!     { "kind": "ramp_parameter", "parameter": "energy", "target": 50.0, "duration": 2.0 },
//!     { "kind": "wait", "duration": 1.0, "timeout": 5.0 },
//!     { "kind": "assert_condition", "condition": { "status": "nominal" } }
//! ] }
//! ```
//!
//! or a bare array of steps. Parameter names are resolved while parsing, so a
//! misspelled field never reaches the executor.

use std::path::Path;

use crate::error::Result;
use crate::sim::{BeamStatus, Comparison, Condition, Parameter, Sequence, SequenceStep, Species};

/// Parse and validate a sequence document
pub fn parse_sequence(json: &str) -> Result<Sequence> {
    let sequence = if json.trim_start().starts_with('[') {
        Sequence::from(serde_json::from_str::<Vec<SequenceStep>>(json)?)
    } else {
        serde_json::from_str::<Sequence>(json)?
    };
    sequence.validate()?;
    Ok(sequence)
}

/// Read a sequence document from disk
///
/// An unnamed sequence takes the file stem as its name.
pub fn load_sequence(path: impl AsRef<Path>) -> Result<Sequence> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    let mut sequence = parse_sequence(&json)?;
    if sequence.name.is_empty() {
        if let Some(stem) = path.file_stem() {
            sequence.name = stem.to_string_lossy().into_owned();
        }
    }
    log::info!(
        "Read sequence {:?} from {} ({} steps)",
        sequence.name,
        path.display(),
        sequence.len()
    );
    Ok(sequence)
}

/// Render a sequence back to a pretty-printed document
pub fn to_json(sequence: &Sequence) -> Result<String> {
    Ok(serde_json::to_string_pretty(sequence)?)
}

/// Built-in injection, ramp, and extraction cycle
pub fn demo_sequence() -> Sequence {
    Sequence::new(
        "demo cycle",
        vec![
            SequenceStep::inject(Species::Proton, 200),
            SequenceStep::set(Parameter::Energy, 0.4),
            SequenceStep::ramp(Parameter::Energy, 50.0, 2.0).with_timeout(3.0),
            SequenceStep::wait(1.0),
            SequenceStep::assert(Condition::status(BeamStatus::Nominal)),
            SequenceStep::assert(Condition::compare(
                Parameter::Intensity,
                Comparison::Greater,
                0.0,
            )),
            SequenceStep::extract(),
            SequenceStep::assert(Condition::compare(
                Parameter::Intensity,
                Comparison::Equal,
                0.0,
            )),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sim::StepKind;

    #[test]
    fn test_parse_document() {
        let json = r#"{
            "name": "example",
            "steps": [
                { "kind": "wait", "duration": 2.0 },
                { "kind": "set_parameter", "parameter": "intensity", "value": 5.0, "timeout": 1.0 },
                { "kind": "assert_condition",
                  "condition": { "parameter": "intensity", "comparison": ">", "value": 0 } }
            ]
        }"#;
        let seq = parse_sequence(json).unwrap();
        assert_eq!(seq.name, "example");
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.steps[0], SequenceStep::wait(2.0));
        assert_eq!(
            seq.steps[1],
            SequenceStep::set(Parameter::Intensity, 5.0).with_timeout(1.0)
        );
        assert_eq!(
            seq.steps[2].kind,
            StepKind::AssertCondition {
                condition: Condition::compare(Parameter::Intensity, Comparison::Greater, 0.0)
            }
        );
    }

    #[test]
    fn test_parse_bare_array() {
        let json = r#"[
            { "kind": "inject", "species": "lead_ion", "count": 12 },
            { "kind": "assert_condition", "condition": { "status": "warning" } },
            { "kind": "extract" }
        ]"#;
        let seq = parse_sequence(json).unwrap();
        assert!(seq.name.is_empty());
        assert_eq!(seq.steps[0], SequenceStep::inject(Species::LeadIon, 12));
        assert_eq!(
            seq.steps[1],
            SequenceStep::assert(Condition::status(BeamStatus::Warning))
        );
        assert_eq!(seq.steps[2], SequenceStep::extract());
    }

    #[test]
    fn test_unknown_parameter_rejected_at_parse() {
        let json = r#"[{ "kind": "set_parameter", "parameter": "velocity", "value": 1.0 }]"#;
        assert!(matches!(parse_sequence(json), Err(Error::Json(_))));
    }

    #[test]
    fn test_empty_and_invalid_documents() {
        assert!(matches!(parse_sequence("[]"), Err(Error::EmptySequence)));
        assert!(matches!(
            parse_sequence(r#"{ "steps": [] }"#),
            Err(Error::EmptySequence)
        ));
        assert!(matches!(
            parse_sequence(r#"[{ "kind": "wait", "duration": -1 }]"#),
            Err(Error::InvalidStep { index: 0, .. })
        ));
    }

    #[test]
    fn test_oversized_bunch_rejected_at_parse() {
        let json = r#"[
            { "kind": "wait", "duration": 1.0 },
            { "kind": "inject", "species": "proton", "count": 18446744073709551615 }
        ]"#;
        assert!(matches!(
            parse_sequence(json),
            Err(Error::InvalidStep { index: 1, .. })
        ));

        let json = r#"[{ "kind": "inject", "species": "proton", "count": 100000 }]"#;
        assert!(parse_sequence(json).is_ok());
    }

    #[test]
    fn test_demo_round_trips() {
        let demo = demo_sequence();
        assert!(demo.validate().is_ok());
        let json = to_json(&demo).unwrap();
        assert_eq!(parse_sequence(&json).unwrap(), demo);
    }

    #[test]
    fn test_load_sequence_names_from_file() {
        let dir = std::env::temp_dir().join(format!("beam-sequencer-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("warmup.json");
        std::fs::write(&path, r#"[{ "kind": "wait", "duration": 0.5 }]"#).unwrap();

        let seq = load_sequence(&path).unwrap();
        assert_eq!(seq.name, "warmup");

        assert!(matches!(
            load_sequence(dir.join("missing.json")),
            Err(Error::Io(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
