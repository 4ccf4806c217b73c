mod common;

use common::*;
use serde_json::json;

fn codes(errors: &[msh::ebms::Ebms3Error]) -> Vec<&'static str> {
    errors.iter().map(|error| error.code.code()).collect()
}

#[tokio::test]
async fn body_payload_with_declaring_part_succeeds() {
    let engine = engine_with_pmodes(vec![pmode("p-basic")], MockSecurityEngine::accepting()).await;

    let content = user_message_content("m1", Some(json!([{ "properties": [] }])));
    let envelope = envelope_with_messaging(content, json!({"Invoice": {"total": "100"}}));

    let state = engine.receive(envelope, Vec::new()).await.expect("accepted");
    assert!(state.soap_body_payload_present);
    assert_eq!(state.pmode.as_ref().map(|p| p.id.as_str()), Some("p-basic"));
    assert_eq!(state.leg.map(|leg| leg.as_u8()), Some(1));
    assert!(state.mpc.is_some());
    assert!(!state.duplicate);
}

#[tokio::test]
async fn declared_body_payload_with_empty_body_is_inconsistent() {
    let engine = engine_with_pmodes(vec![pmode("p-basic")], MockSecurityEngine::accepting()).await;

    let content = user_message_content("m2", Some(json!([{ "properties": [] }])));
    let envelope = envelope_with_messaging(content, json!({}));

    let errors = engine.receive(envelope, Vec::new()).await.expect_err("rejected");
    assert!(codes(&errors).contains(&"EBMS:0003"), "got {errors:?}");
}

#[tokio::test]
async fn undeclared_body_payload_is_inconsistent() {
    let engine = engine_with_pmodes(vec![pmode("p-basic")], MockSecurityEngine::accepting()).await;

    let content = user_message_content("m3", None);
    let envelope = envelope_with_messaging(content, json!({"Invoice": {}}));

    let errors = engine.receive(envelope, Vec::new()).await.expect_err("rejected");
    assert!(codes(&errors).contains(&"EBMS:0003"), "got {errors:?}");
}

#[tokio::test]
async fn attachment_without_declared_part_is_an_external_payload_error() {
    let engine = engine_with_pmodes(vec![pmode("p-basic")], MockSecurityEngine::accepting()).await;

    let content = user_message_content("m4", None);
    let envelope = envelope_with_messaging(content, json!(null));
    let attachments = vec![msh::soap::Attachment::new("part-1@msh", b"data".to_vec())];

    let errors = engine.receive(envelope, attachments).await.expect_err("rejected");
    assert!(codes(&errors).contains(&"EBMS:0011"), "got {errors:?}");
}

#[tokio::test]
async fn declared_part_without_attachment_is_an_external_payload_error() {
    let engine = engine_with_pmodes(vec![pmode("p-basic")], MockSecurityEngine::accepting()).await;

    let content = user_message_content(
        "m5",
        Some(json!([{
            "href": "cid:part-1@msh",
            "properties": [{ "name": "MimeType", "value": "application/xml" }]
        }])),
    );
    let envelope = envelope_with_messaging(content, json!(null));

    let errors = engine.receive(envelope, Vec::new()).await.expect_err("rejected");
    assert!(codes(&errors).contains(&"EBMS:0011"), "got {errors:?}");
}

#[tokio::test]
async fn matching_attachment_and_part_counts_succeed() {
    let engine = engine_with_pmodes(vec![pmode("p-basic")], MockSecurityEngine::accepting()).await;

    let content = user_message_content(
        "m6",
        Some(json!([{
            "href": "cid:part-1@msh",
            "properties": [{ "name": "MimeType", "value": "application/xml" }]
        }])),
    );
    let envelope = envelope_with_messaging(content, json!(null));
    let attachments = vec![msh::soap::Attachment::new("part-1@msh", b"data".to_vec())];

    let state = engine.receive(envelope, attachments).await.expect("accepted");
    assert!(!state.soap_body_payload_present);
    assert_eq!(state.attachments.len(), 1);
}

#[tokio::test]
async fn compression_without_mime_type_is_inconsistent() {
    let engine = engine_with_pmodes(vec![pmode("p-basic")], MockSecurityEngine::accepting()).await;

    let content = user_message_content(
        "m7",
        Some(json!([{
            "href": "cid:part-1@msh",
            "properties": [{ "name": "CompressionType", "value": "application/gzip" }]
        }])),
    );
    let envelope = envelope_with_messaging(content, json!(null));
    let attachments = vec![msh::soap::Attachment::new("part-1@msh", b"data".to_vec())];

    let errors = engine.receive(envelope, attachments).await.expect_err("rejected");
    assert!(codes(&errors).contains(&"EBMS:0003"), "got {errors:?}");
}

#[tokio::test]
async fn unsupported_compression_value_is_inconsistent() {
    let engine = engine_with_pmodes(vec![pmode("p-basic")], MockSecurityEngine::accepting()).await;

    let content = user_message_content(
        "m8",
        Some(json!([{
            "href": "cid:part-1@msh",
            "properties": [
                { "name": "MimeType", "value": "application/xml" },
                { "name": "CompressionType", "value": "application/zip" }
            ]
        }])),
    );
    let envelope = envelope_with_messaging(content, json!(null));
    let attachments = vec![msh::soap::Attachment::new("part-1@msh", b"data".to_vec())];

    let errors = engine.receive(envelope, attachments).await.expect_err("rejected");
    assert!(codes(&errors).contains(&"EBMS:0003"), "got {errors:?}");
}

#[tokio::test]
async fn gzip_compression_is_tracked_per_attachment() {
    let engine = engine_with_pmodes(vec![pmode("p-basic")], MockSecurityEngine::accepting()).await;

    let content = user_message_content(
        "m9",
        Some(json!([{
            "href": "cid:part-1@msh",
            "properties": [
                { "name": "MimeType", "value": "application/xml" },
                { "name": "CompressionType", "value": "application/gzip" }
            ]
        }])),
    );
    let envelope = envelope_with_messaging(content, json!(null));
    let attachments = vec![msh::soap::Attachment::new("part-1@msh", b"gz".to_vec())];

    let state = engine.receive(envelope, attachments).await.expect("accepted");
    assert_eq!(
        state.compression.get("part-1@msh"),
        Some(&msh::pipeline::CompressionMode::Gzip)
    );
}

#[tokio::test]
async fn unresolvable_pmode_is_a_processing_mode_mismatch() {
    let engine = engine_with_pmodes(Vec::new(), MockSecurityEngine::accepting()).await;

    let content = user_message_content("m10", None);
    let envelope = envelope_with_messaging(content, json!(null));

    let errors = engine.receive(envelope, Vec::new()).await.expect_err("rejected");
    assert_eq!(codes(&errors), vec!["EBMS:0010"]);
}

#[tokio::test]
async fn pull_request_on_unknown_mpc_is_not_recognized() {
    let engine = engine_with_pmodes(Vec::new(), MockSecurityEngine::accepting()).await;

    let content = json!({
        "signal_messages": [{
            "message_info": { "message_id": "sig-1" },
            "pull_request": { "mpc": "urn:mpc:absent" }
        }]
    });
    let envelope = envelope_with_messaging(content, json!(null));

    let errors = engine.receive(envelope, Vec::new()).await.expect_err("rejected");
    assert_eq!(codes(&errors), vec!["EBMS:0001"]);
}

#[tokio::test]
async fn missing_messaging_header_is_an_invalid_header() {
    let engine = engine_with_pmodes(Vec::new(), MockSecurityEngine::accepting()).await;

    let envelope = msh::soap::SoapEnvelope::new(msh::soap::SoapVersion::Soap12);
    let errors = engine.receive(envelope, Vec::new()).await.expect_err("rejected");
    assert_eq!(codes(&errors), vec!["EBMS:0009"]);
}

#[tokio::test]
async fn reply_message_selects_leg_two_of_a_two_way_pmode() {
    let mut two_way = pmode("p-two-way");
    two_way.mep = msh::pmode::Mep::TwoWay;
    two_way.binding = msh::pmode::MepBinding::PushPush;
    two_way.leg2 = Some(leg("urn:invoicing:reply", "respond"));

    let engine = engine_with_pmodes(vec![two_way], MockSecurityEngine::accepting()).await;

    let mut content = user_message_content("m12", None);
    content["user_messages"][0]["message_info"]["ref_to_message_id"] = json!("m11");
    let envelope = envelope_with_messaging(content, json!(null));

    let state = engine.receive(envelope, Vec::new()).await.expect("accepted");
    assert_eq!(state.leg.map(|leg| leg.as_u8()), Some(2));
}

#[tokio::test]
async fn reply_with_leg_two_service_and_action_resolves_its_pmode() {
    let mut two_way = pmode("p-two-way");
    two_way.mep = msh::pmode::Mep::TwoWay;
    two_way.binding = msh::pmode::MepBinding::PushPush;
    two_way.leg2 = Some(leg("urn:invoicing:reply", "respond"));

    let engine = engine_with_pmodes(vec![two_way], MockSecurityEngine::accepting()).await;

    // The reply travels in the opposite direction and carries leg 2's
    // business info; no explicit PMode id is named.
    let mut content = user_message_content("m14", None);
    content["user_messages"][0]["message_info"]["ref_to_message_id"] = json!("m13");
    content["user_messages"][0]["collaboration_info"]["service"] =
        json!({ "value": "urn:invoicing:reply" });
    content["user_messages"][0]["collaboration_info"]["action"] = json!("respond");
    content["user_messages"][0]["party_info"] = json!({
        "from": { "party_ids": [{ "value": RECEIVER }], "role": "Responder" },
        "to": { "party_ids": [{ "value": SENDER }], "role": "Initiator" }
    });
    let envelope = envelope_with_messaging(content, json!(null));

    let state = engine.receive(envelope, Vec::new()).await.expect("accepted");
    assert_eq!(state.pmode.as_ref().map(|p| p.id.as_str()), Some("p-two-way"));
    assert_eq!(state.leg.map(|leg| leg.as_u8()), Some(2));
}

#[tokio::test]
async fn leg_declaring_an_unregistered_mpc_is_a_processing_mode_mismatch() {
    let mut misconfigured = pmode("p-ghost-mpc");
    if let Some(leg) = misconfigured.leg1.as_mut() {
        leg.business_info.mpc = Some("urn:mpc:ghost".to_string());
    }

    let engine =
        engine_with_pmodes(vec![misconfigured], MockSecurityEngine::accepting()).await;

    let content = user_message_content("m15", None);
    let envelope = envelope_with_messaging(content, json!(null));

    let errors = engine.receive(envelope, Vec::new()).await.expect_err("rejected");
    assert_eq!(codes(&errors), vec!["EBMS:0010"]);
}

#[tokio::test]
async fn user_message_naming_an_unknown_mpc_is_inconsistent() {
    let engine = engine_with_pmodes(vec![pmode("p-basic")], MockSecurityEngine::accepting()).await;

    let mut content = user_message_content("m16", None);
    content["user_messages"][0]["mpc"] = json!("urn:mpc:absent");
    let envelope = envelope_with_messaging(content, json!(null));

    let errors = engine.receive(envelope, Vec::new()).await.expect_err("rejected");
    assert_eq!(codes(&errors), vec!["EBMS:0003"]);
}

#[tokio::test]
async fn two_user_messages_in_one_envelope_are_inconsistent() {
    let engine = engine_with_pmodes(vec![pmode("p-basic")], MockSecurityEngine::accepting()).await;

    let user = user_message_content("m11", None)["user_messages"][0].clone();
    let content = json!({ "user_messages": [user.clone(), user] });
    let envelope = envelope_with_messaging(content, json!(null));

    let errors = engine.receive(envelope, Vec::new()).await.expect_err("rejected");
    assert_eq!(codes(&errors), vec!["EBMS:0003"]);
}
