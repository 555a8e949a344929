use crate::capability::Capability;
use crate::models::Report;
use std::collections::BTreeSet;

/// Pipelines that apply to a report's available inputs.
///
/// Text selects text classification; media selects captioning, object detection and
/// visual question answering. A report with neither selects nothing.
pub fn select_pipelines(report: &Report) -> BTreeSet<Capability> {
    select_for_inputs(report.has_text(), report.has_media())
}

pub fn select_for_inputs(has_text: bool, has_media: bool) -> BTreeSet<Capability> {
    Capability::ALL
        .into_iter()
        .filter(|capability| {
            if capability.requires_media() {
                has_media
            } else {
                has_text
            }
        })
        .collect()
}
