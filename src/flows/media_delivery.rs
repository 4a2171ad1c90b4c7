//! Delivery status, gallery sharing, downloads and reshoot requests

use super::{
    link_token, log_soft_failure, pick_shoot, scope, shoot_label, shoot_labels, unknown_reference,
    Pick,
};
use crate::intent::Intent;
use crate::state_machine::extract;
use crate::state_machine::{
    Action, FlowError, FlowReply, FlowState, Progress, StepMachine, StepName, Transition, Turn,
};
use crate::studio::{Email, Shoot, ShootId, ShootOrder, ShootStatus, ShootUpdate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaDeliveryStep {
    AskAction,
    DeliveryStatus,
    ShareGallery,
    RequestReshoot,
    DownloadAll,
}

impl StepName for MediaDeliveryStep {
    fn name(self) -> &'static str {
        match self {
            MediaDeliveryStep::AskAction => "ask_action",
            MediaDeliveryStep::DeliveryStatus => "delivery_status",
            MediaDeliveryStep::ShareGallery => "share_gallery",
            MediaDeliveryStep::RequestReshoot => "request_reshoot",
            MediaDeliveryStep::DownloadAll => "download_all",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaDeliveryData {
    pub shoot_id: Option<ShootId>,
    /// Gallery link already generated for `shoot_id`
    pub link: Option<String>,
}

const MENU: [&str; 4] = [
    "Check delivery status",
    "Share gallery with client",
    "Request reshoot",
    "Download all photos",
];

const RESHOOT_REASONS: &[(&str, &str)] = &[
    ("weather", "Bad weather"),
    ("rain", "Bad weather"),
    ("stag", "Staging issues"),
    ("furniture", "Staging issues"),
    ("quality", "Photo quality"),
    ("blur", "Photo quality"),
    ("dark", "Photo quality"),
    ("missing", "Missing shots"),
    ("forgot", "Missing shots"),
];

/// Download links stop working after this many hours
const DOWNLOAD_TTL_HOURS: u32 = 24;

pub struct MediaDelivery;

impl StepMachine for MediaDelivery {
    type Step = MediaDeliveryStep;
    type Data = MediaDeliveryData;

    const INTENT: Intent = Intent::MediaDelivery;

    fn initial_step(&self) -> MediaDeliveryStep {
        MediaDeliveryStep::AskAction
    }

    fn step(
        &self,
        step: MediaDeliveryStep,
        data: &mut MediaDeliveryData,
        turn: &mut Turn<'_>,
    ) -> Result<Transition<MediaDeliveryStep>, FlowError> {
        match step {
            MediaDeliveryStep::AskAction => Ok(ask_action(turn)),
            MediaDeliveryStep::DeliveryStatus => delivery_status(turn),
            MediaDeliveryStep::ShareGallery => share_gallery(data, turn),
            MediaDeliveryStep::RequestReshoot => request_reshoot(data, turn),
            MediaDeliveryStep::DownloadAll => download_all(turn),
        }
    }

    fn pack(step: MediaDeliveryStep, data: MediaDeliveryData) -> FlowState {
        FlowState::MediaDelivery(Progress { step, data })
    }

    fn unpack(state: FlowState) -> Option<(MediaDeliveryStep, MediaDeliveryData)> {
        match state {
            FlowState::MediaDelivery(p) => Some((p.step, p.data)),
            _ => None,
        }
    }
}

fn ask_action(turn: &Turn<'_>) -> Transition<MediaDeliveryStep> {
    if turn.mentions(&["reshoot", "redo", "re-shoot"]) {
        Transition::Advance(MediaDeliveryStep::RequestReshoot)
    } else if turn.mentions(&["download"]) {
        Transition::Advance(MediaDeliveryStep::DownloadAll)
    } else if turn.mentions(&["share", "gallery", "send photos"]) {
        Transition::Advance(MediaDeliveryStep::ShareGallery)
    } else if turn.mentions(&["status", "ready", "deliver", "where are", "edit"]) {
        Transition::Advance(MediaDeliveryStep::DeliveryStatus)
    } else {
        Transition::Await(
            MediaDeliveryStep::AskAction,
            FlowReply::say("What would you like to do with your photos?").with_suggestions(MENU),
        )
    }
}

/// Shoots with edited photos that can be shared or downloaded
fn deliverable(turn: &Turn<'_>) -> Result<Vec<Shoot>, FlowError> {
    Ok(turn
        .studio
        .shoots
        .shoots(
            &scope(turn)
                .with_status(&[ShootStatus::Completed, ShootStatus::Ready, ShootStatus::Delivered])
                .order(ShootOrder::ScheduledDesc),
        )?
        .into_iter()
        .filter(|s| s.processed_media() > 0)
        .take(10)
        .collect())
}

// ==================== Status ====================

fn delivery_label(shoot: &Shoot) -> &'static str {
    match shoot.status {
        ShootStatus::Delivered => "Delivered",
        ShootStatus::Ready => "Ready for Delivery",
        ShootStatus::Editing => "In Editing",
        ShootStatus::Completed if shoot.processed_media() > 0 => "Ready for Delivery",
        ShootStatus::Completed => "Awaiting Photos",
        _ => "Shoot Scheduled",
    }
}

fn delivery_status(turn: &mut Turn<'_>) -> Result<Transition<MediaDeliveryStep>, FlowError> {
    let candidates = turn.studio.shoots.shoots(
        &scope(turn)
            .with_status(&[
                ShootStatus::Editing,
                ShootStatus::Ready,
                ShootStatus::Delivered,
                ShootStatus::Completed,
            ])
            .order(ShootOrder::ScheduledDesc)
            .limit(10),
    )?;
    match pick_shoot(turn, &candidates) {
        Pick::Found(shoot) => {
            let processed = shoot.processed_media();
            let progress = if processed > 0 {
                "Edited photos are ready to share."
            } else {
                "Photos are still being edited."
            };
            Ok(Transition::Finish(
                FlowReply::say(format!(
                    "📦 **{}**\n\nStatus: {}\nFiles: {processed} of {} ready\n\n{progress}",
                    shoot_label(&shoot),
                    delivery_label(&shoot),
                    shoot.media.len(),
                ))
                .with_metadata("shoot_id", shoot.id)
                .with_action(Action::OpenShoot { shoot_id: shoot.id })
                .with_suggestions(["Share gallery with client", "Download all photos"]),
            ))
        }
        Pick::Missing(reference) => Ok(Transition::Await(
            MediaDeliveryStep::DeliveryStatus,
            unknown_reference("a delivered shoot", &reference, shoot_labels(&candidates)),
        )),
        Pick::Nothing if candidates.is_empty() => Ok(Transition::Finish(
            FlowReply::say("None of your shoots are in editing or delivery yet.")
                .with_suggestions(["Book a new shoot"]),
        )),
        Pick::Nothing => {
            let lines: Vec<String> = candidates
                .iter()
                .map(|s| {
                    format!(
                        "• {} · {} · {} of {} files ready",
                        shoot_label(s),
                        delivery_label(s),
                        s.processed_media(),
                        s.media.len()
                    )
                })
                .collect();
            Ok(Transition::Await(
                MediaDeliveryStep::DeliveryStatus,
                FlowReply::say(format!(
                    "📦 **Delivery status**\n\n{}\n\nPick a shoot for details.",
                    lines.join("\n")
                ))
                .with_suggestions(shoot_labels(&candidates)),
            ))
        }
    }
}

// ==================== Galleries ====================

fn share_gallery(
    data: &mut MediaDeliveryData,
    turn: &mut Turn<'_>,
) -> Result<Transition<MediaDeliveryStep>, FlowError> {
    if let (Some(shoot_id), Some(link)) = (data.shoot_id, data.link.clone()) {
        if turn.mentions(&["another"]) {
            *data = MediaDeliveryData::default();
            return Ok(Transition::Advance(MediaDeliveryStep::ShareGallery));
        }
        if turn.mentions(&["copy"]) {
            return Ok(Transition::Finish(
                FlowReply::say(format!("Here's the gallery link:\n{link}"))
                    .with_suggestions(["Share another gallery"]),
            ));
        }
        let text = turn.text();
        if extract::is_negative(&text) {
            return Ok(Transition::Finish(FlowReply::say(
                "Okay, the link is ready whenever you need it.",
            )));
        }
        if extract::is_affirmative(&text) || turn.mentions(&["email", "send"]) {
            return email_gallery(shoot_id, &link, turn);
        }
        return Ok(Transition::Await(
            MediaDeliveryStep::ShareGallery,
            FlowReply::say("Should I email the gallery link to the client?")
                .with_suggestions(["Yes, email it to the client", "Copy link"]),
        ));
    }

    let candidates = deliverable(turn)?;
    let shoot = match pick_shoot(turn, &candidates) {
        Pick::Found(shoot) => shoot,
        Pick::Missing(reference) => {
            return Ok(Transition::Await(
                MediaDeliveryStep::ShareGallery,
                unknown_reference("a ready gallery for", &reference, shoot_labels(&candidates)),
            ));
        }
        Pick::Nothing if candidates.is_empty() => {
            return Ok(Transition::Finish(
                FlowReply::say("No galleries are ready to share yet. I'll have them once editing wraps up.")
                    .with_suggestions(["Check delivery status"]),
            ));
        }
        Pick::Nothing => {
            return Ok(Transition::Await(
                MediaDeliveryStep::ShareGallery,
                FlowReply::say("Which shoot's gallery should I share?")
                    .with_suggestions(shoot_labels(&candidates)),
            ));
        }
    };

    let token = link_token();
    let update = ShootUpdate {
        share_token: Some(token.clone()),
        ..ShootUpdate::default()
    };
    if let Err(err) = turn.studio.shoots.update_shoot(shoot.id, &update) {
        log_soft_failure(turn, Intent::MediaDelivery, "share_gallery", &err);
        return Ok(Transition::Await(
            MediaDeliveryStep::ShareGallery,
            FlowReply::say("I couldn't create a gallery link just now. Want me to try again?")
                .with_suggestions(["Try again", "Start over"]),
        ));
    }
    let link = turn.studio.link(&format!("/gallery/{}?token={token}", shoot.id));
    data.shoot_id = Some(shoot.id);
    data.link = Some(link.clone());

    Ok(Transition::Await(
        MediaDeliveryStep::ShareGallery,
        FlowReply::say(format!(
            "🔗 Here's the gallery for **{}** ({} photos):\n{link}\n\nShould I email it to the client?",
            shoot_label(&shoot),
            shoot.processed_media(),
        ))
        .with_metadata("shoot_id", shoot.id)
        .with_suggestions(["Yes, email it to the client", "Copy link", "Share another gallery"]),
    ))
}

fn email_gallery(
    shoot_id: ShootId,
    link: &str,
    turn: &mut Turn<'_>,
) -> Result<Transition<MediaDeliveryStep>, FlowError> {
    let shoot = turn.studio.shoots.shoot(shoot_id)?;
    let client = turn.studio.directory.user(shoot.client_id)?;
    let email = Email {
        to: client.email.clone(),
        subject: format!("Your photos of {} are ready", shoot.address),
        body: format!(
            "Hi {},\n\nYour edited photos of {} are ready to view and download:\n{link}\n\nEnjoy!",
            client.name,
            shoot.location_label()
        ),
    };
    match turn.studio.messenger.send_email(&email) {
        Ok(()) => Ok(Transition::Finish(
            FlowReply::say(format!("📧 Sent the gallery link to {} ({}).", client.name, client.email))
                .with_suggestions(["Share another gallery", "Check delivery status"]),
        )),
        Err(err) => {
            log_soft_failure(turn, Intent::MediaDelivery, "share_gallery", &err);
            Ok(Transition::Finish(FlowReply::say(format!(
                "I couldn't email {} right now. You can share the link yourself:\n{link}",
                client.name
            ))))
        }
    }
}

// ==================== Downloads ====================

fn download_all(turn: &mut Turn<'_>) -> Result<Transition<MediaDeliveryStep>, FlowError> {
    let candidates = deliverable(turn)?;
    let shoot = match pick_shoot(turn, &candidates) {
        Pick::Found(shoot) => shoot,
        Pick::Missing(reference) => {
            return Ok(Transition::Await(
                MediaDeliveryStep::DownloadAll,
                unknown_reference("edited photos for", &reference, shoot_labels(&candidates)),
            ));
        }
        Pick::Nothing if candidates.is_empty() => {
            return Ok(Transition::Finish(
                FlowReply::say("There's nothing to download yet. Edited photos show up here once they're ready.")
                    .with_suggestions(["Check delivery status"]),
            ));
        }
        Pick::Nothing => {
            return Ok(Transition::Await(
                MediaDeliveryStep::DownloadAll,
                FlowReply::say("Which shoot would you like to download?")
                    .with_suggestions(shoot_labels(&candidates)),
            ));
        }
    };

    let token = link_token();
    let update = ShootUpdate {
        download_token: Some(token.clone()),
        ..ShootUpdate::default()
    };
    if let Err(err) = turn.studio.shoots.update_shoot(shoot.id, &update) {
        log_soft_failure(turn, Intent::MediaDelivery, "download_all", &err);
        return Ok(Transition::Await(
            MediaDeliveryStep::DownloadAll,
            FlowReply::say("I couldn't prepare that download just now. Want me to try again?")
                .with_suggestions(["Try again", "Start over"]),
        ));
    }
    let url = turn
        .studio
        .link(&format!("/api/shoots/{}/download?token={token}", shoot.id));
    Ok(Transition::Finish(
        FlowReply::say(format!(
            "⬇️ Your download for **{}** is ready: {} files. The link expires in {DOWNLOAD_TTL_HOURS} hours.",
            shoot_label(&shoot),
            shoot.processed_media(),
        ))
        .with_metadata("shoot_id", shoot.id)
        .with_action(Action::Download { url })
        .with_suggestions(["Share gallery with client", "Download another shoot"]),
    ))
}

// ==================== Reshoots ====================

fn request_reshoot(
    data: &mut MediaDeliveryData,
    turn: &mut Turn<'_>,
) -> Result<Transition<MediaDeliveryStep>, FlowError> {
    let had_shoot = data.shoot_id.is_some();
    if !had_shoot {
        let candidates = turn.studio.shoots.shoots(
            &scope(turn)
                .with_status(&[
                    ShootStatus::Editing,
                    ShootStatus::Ready,
                    ShootStatus::Delivered,
                    ShootStatus::Completed,
                ])
                .order(ShootOrder::ScheduledDesc)
                .limit(10),
        )?;
        match pick_shoot(turn, &candidates) {
            Pick::Found(shoot) => data.shoot_id = Some(shoot.id),
            Pick::Missing(reference) => {
                return Ok(Transition::Await(
                    MediaDeliveryStep::RequestReshoot,
                    unknown_reference("a completed shoot", &reference, shoot_labels(&candidates)),
                ));
            }
            Pick::Nothing if candidates.is_empty() => {
                return Ok(Transition::Finish(FlowReply::say(
                    "None of your shoots are far enough along for a reshoot.",
                )));
            }
            Pick::Nothing => {
                return Ok(Transition::Await(
                    MediaDeliveryStep::RequestReshoot,
                    FlowReply::say("Which shoot needs a reshoot?")
                        .with_suggestions(shoot_labels(&candidates)),
                ));
            }
        }
    }
    let Some(shoot_id) = data.shoot_id else {
        return Err(FlowError::InvalidState("reshoot without a shoot".to_string()));
    };

    let text = turn.text();
    let mut reason = RESHOOT_REASONS
        .iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map(|(_, reason)| (*reason).to_string());
    if reason.is_none() && had_shoot {
        reason = turn.take_answer();
    }
    let Some(reason) = reason else {
        return Ok(Transition::Await(
            MediaDeliveryStep::RequestReshoot,
            FlowReply::say("What's the reason for the reshoot?").with_suggestions([
                "Bad weather",
                "Staging issues",
                "Photo quality",
                "Missing shots",
            ]),
        ));
    };

    let shoot = turn.studio.shoots.shoot(shoot_id)?;
    turn.studio
        .shoots
        .add_shoot_note(shoot_id, turn.user_id, &format!("Reshoot requested: {reason}"))?;
    turn.studio.shoots.update_shoot(
        shoot_id,
        &ShootUpdate {
            status: Some(ShootStatus::ReshootNeeded),
            ..ShootUpdate::default()
        },
    )?;
    tracing::info!(session_id = %turn.session_id, shoot_id, reason = %reason, "Reshoot requested");
    Ok(Transition::Finish(
        FlowReply::say(format!(
            "🔁 Reshoot requested for **{}**. Reason: {reason}. Our team will reach out to schedule it.",
            shoot_label(&shoot)
        ))
        .with_metadata("shoot_id", shoot_id)
        .with_suggestions(["Check delivery status", "Book a new shoot"]),
    ))
}
