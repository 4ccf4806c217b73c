#![forbid(unsafe_code)]

//! Leg/MEP selection for an inbound user message.

use crate::ebms::error::{Ebms3Error, PROCESSING_MODE_MISMATCH};
use crate::ebms::MessageInfo;

use super::{PMode, PModeLeg};

const ORIGIN: &str = "ebms3";

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum LegNumber {
    Leg1,
    Leg2,
}

impl LegNumber {
    pub fn as_u8(self) -> u8 {
        match self {
            LegNumber::Leg1 => 1,
            LegNumber::Leg2 => 2,
        }
    }
}

/// Picks the leg of `pmode` governing the message described by `info`.
///
/// An empty `RefToMessageId`, or one referencing the message itself, selects
/// leg 1; any other reference selects leg 2 (the reply hop of a two-way
/// exchange). A message referencing itself is suspicious but tolerated.
pub fn select_leg<'p>(
    info: &MessageInfo,
    pmode: &'p PMode,
) -> Result<(LegNumber, &'p PModeLeg), Ebms3Error> {
    let message_id = info.message_id.as_str();
    let ref_to = info.ref_to_message_id();

    let selected = if ref_to.is_empty() {
        LegNumber::Leg1
    } else if ref_to == message_id {
        tracing::warn!(
            target: "msh::pmode",
            event = "message_references_itself",
            message_id = message_id
        );
        LegNumber::Leg1
    } else {
        LegNumber::Leg2
    };

    if selected == LegNumber::Leg2
        && pmode.binding.required_leg_count() == 2
        && pmode.leg2.is_none()
    {
        return Err(Ebms3Error::new(PROCESSING_MODE_MISMATCH)
            .ref_to(message_id)
            .detail(format!(
                "pmode `{}` binding `{}` requires two legs but leg 2 is not configured",
                pmode.id,
                pmode.binding.as_str()
            ))
            .origin(ORIGIN));
    }

    match pmode.leg(selected) {
        Some(leg) => Ok((selected, leg)),
        None => Err(Ebms3Error::new(PROCESSING_MODE_MISMATCH)
            .ref_to(message_id)
            .detail(format!(
                "pmode `{}` has no leg {} for this exchange",
                pmode.id,
                selected.as_u8()
            ))
            .origin(ORIGIN)),
    }
}
