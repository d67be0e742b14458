use feed_api::{InvalidMatch, Match};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode: {0}")]
    Encode(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("invalid match: {0}")]
    Invalid(#[from] InvalidMatch),
}

/// JSON wire codec for [`Match`].
///
/// Payload is a single JSON object with snake_case field names and an
/// RFC 3339 `kick_off`. Decoding also enforces the record invariants, so a
/// structurally valid but inconsistent payload is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode(&self, record: &Match) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(record).map_err(|e| CodecError::Encode(e.to_string()))
    }

    pub fn decode(&self, payload: &[u8]) -> Result<Match, CodecError> {
        let record: Match =
            serde_json::from_slice(payload).map_err(|e| CodecError::Decode(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use feed_api::Team;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use uuid::Uuid;

    use super::*;
    use crate::catalog::Catalog;
    use crate::factory::RecordFactory;

    fn derby() -> Match {
        let t1 = Team::new(11, "Boca Juniors", "La Bombonera");
        let t2 = Team::new(12, "River Plate", "Monumental");
        Match {
            id: Uuid::new_v4(),
            stadium: t1.stadium.clone(),
            home_team: t1,
            away_team: t2,
            round: 5,
            competition: "Liga Profesional".into(),
            country: "Argentina".into(),
            kick_off: Utc.with_ymd_and_hms(2026, 3, 14, 20, 30, 0).unwrap(),
        }
    }

    #[test]
    fn explicit_teams_survive_the_wire() {
        let codec = JsonCodec;
        let original = derby();

        let decoded = codec.decode(&codec.encode(&original).unwrap()).unwrap();

        assert_eq!(decoded, original);
        assert_eq!(decoded.home_team.name, "Boca Juniors");
        assert_eq!(decoded.away_team.name, "River Plate");
        assert_eq!(decoded.stadium, "La Bombonera");
        assert_eq!(decoded.kick_off, original.kick_off);
    }

    #[test]
    fn wire_format_uses_snake_case_and_rfc3339() {
        let json: serde_json::Value = serde_json::from_slice(&JsonCodec.encode(&derby()).unwrap()).unwrap();
        let obj = json.as_object().unwrap();

        for field in ["id", "home_team", "away_team", "stadium", "round", "competition", "country", "kick_off"] {
            assert!(obj.contains_key(field), "missing {field}");
        }
        assert_eq!(obj.len(), 8);
        assert_eq!(json["kick_off"], "2026-03-14T20:30:00Z");
        assert_eq!(json["home_team"]["stadium"], "La Bombonera");
    }

    #[test]
    fn malformed_payloads_are_decode_errors() {
        let codec = JsonCodec;
        for payload in [&b""[..], b"not json", b"{}", b"[1,2,3]", b"{\"id\":42}"] {
            assert!(matches!(codec.decode(payload), Err(CodecError::Decode(_))));
        }
    }

    #[test]
    fn inconsistent_record_is_rejected() {
        let mut m = derby();
        m.away_team = m.home_team.clone();
        let payload = serde_json::to_vec(&m).unwrap();
        assert!(matches!(
            JsonCodec.decode(&payload),
            Err(CodecError::Invalid(InvalidMatch::SameTeam(11)))
        ));
    }

    proptest! {
        #[test]
        fn generated_matches_survive_the_wire(seed in any::<u64>()) {
            let factory = RecordFactory::new(Arc::new(Catalog::football().unwrap()));
            // Utc::now() carries sub-second precision down to nanoseconds.
            let m = factory.create_with(&mut StdRng::seed_from_u64(seed), Utc::now());

            let decoded = JsonCodec.decode(&JsonCodec.encode(&m).unwrap()).unwrap();
            prop_assert_eq!(&decoded, &m);
            prop_assert_eq!(decoded.kick_off.timestamp_nanos_opt(), m.kick_off.timestamp_nanos_opt());
        }
    }
}
