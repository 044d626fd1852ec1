//! Inbound routing. Parses commands and button callbacks, invokes the
//! workflows, and renders their discriminated results into reply text.
//! No other layer produces user-visible wording.

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::activity;
use crate::ai::chat as ai_chat;
use crate::ledger;
use crate::models::job::JobStatus;
use crate::models::promotion::PromoKind;
use crate::scheduler::{self, TaskAction};
use crate::state::AppState;
use crate::transport::Update;
use crate::workflows::admin::{self, ResetTarget};
use crate::workflows::applications::{self, ApplyError};
use crate::workflows::leaderboard;
use crate::workflows::promotions::{self, ClickError, FollowersError, PromoteError};
use crate::workflows::registration::{self, NewMember, ProfileError, ProfileField, RegisterError};

/// Group messages shorter than this earn no activity point.
const ACTIVITY_MIN_CHARS: usize = 10;
const PROMO_DELETE_AFTER_HOURS: i64 = 24;
const PROMO_UNPIN_AFTER_HOURS: i64 = 48;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Register(Box<NewMember>),
    EditInfo { field: ProfileField, value: String },
    MyInfo,
    MyReferral,
    Points,
    Leaderboard,
    ListJobs,
    InfoJob(i64),
    Promote { link: String, kind: PromoKind },
    Followers(String),
    StartAi,
    StopAi,
    Ai(String),
    Summary,
    Help,
    // Admin surface.
    PostJob { title: String, fee: String, description: String },
    UpdateJob { job_id: i64, status: JobStatus },
    ResetJob(Option<i64>),
    Applicants(i64),
    ListMembers,
    MemberInfo(String),
    PaymentInfo,
    DeleteMember(String),
    ResetPoints(String),
    AddPoints { username: String, delta: i64 },
    AddBadge { username: String, badge: String },
    ResetApply(ResetTarget),
    ResetBadge(ResetTarget),
}

/// Parse result: `Err` carries the usage reply for a malformed invocation.
pub fn parse_command(text: &str) -> Option<Result<Command, String>> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }
    let (name, rest) = match text.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (text, ""),
    };
    // Strip the optional @botname suffix used in groups.
    let name = name.split('@').next().unwrap_or(name);

    let parsed = match name {
        "/register" => parse_register(rest),
        "/editinfo" => parse_editinfo(rest),
        "/myinfo" => Ok(Command::MyInfo),
        "/myreferral" => Ok(Command::MyReferral),
        "/points" => Ok(Command::Points),
        "/leaderboard" => Ok(Command::Leaderboard),
        "/listjob" => Ok(Command::ListJobs),
        "/infojob" => parse_job_id(rest).map(Command::InfoJob),
        "/promote" => parse_promote(rest, PromoKind::Standard),
        "/promote_special" => parse_promote(rest, PromoKind::Special),
        "/followers" => {
            if rest.is_empty() {
                Err("Usage: /followers <promo_id>".to_string())
            } else {
                Ok(Command::Followers(rest.to_string()))
            }
        }
        "/startai" => Ok(Command::StartAi),
        "/stopai" => Ok(Command::StopAi),
        "/ai" => {
            if rest.is_empty() {
                Err("Usage: /ai <question>".to_string())
            } else {
                Ok(Command::Ai(rest.to_string()))
            }
        }
        "/summary" => Ok(Command::Summary),
        "/help" => Ok(Command::Help),
        "/postjob" => parse_postjob(rest),
        "/updatejob" => parse_updatejob(rest),
        "/resetjob" => parse_resetjob(rest),
        "/applicants" => parse_job_id(rest).map(Command::Applicants),
        "/listmember" => Ok(Command::ListMembers),
        "/memberinfo" => {
            if rest.is_empty() {
                Err("Usage: /memberinfo <username>".to_string())
            } else {
                Ok(Command::MemberInfo(rest.to_string()))
            }
        }
        "/paymentinfo" => Ok(Command::PaymentInfo),
        "/delete" => {
            if rest.is_empty() {
                Err("Usage: /delete <username>".to_string())
            } else {
                Ok(Command::DeleteMember(rest.to_string()))
            }
        }
        "/resetpoint" => {
            if rest.is_empty() {
                Err("Usage: /resetpoint <username>".to_string())
            } else {
                Ok(Command::ResetPoints(rest.to_string()))
            }
        }
        "/addpoint" => parse_addpoint(rest),
        "/addbadge" => parse_addbadge(rest),
        "/resetapply" => parse_reset_target(rest).map(Command::ResetApply),
        "/resetbadge" => parse_reset_target(rest).map(Command::ResetBadge),
        _ => Err(format!("Unknown command {name}. Try /help.")),
    };
    Some(parsed)
}

fn parse_register(rest: &str) -> Result<Command, String> {
    const USAGE: &str =
        "Usage: /register <username>|<whatsapp>|<telegram>|<payment method>|<payment number>|<account holder>[|referrer]";
    let parts: Vec<&str> = rest.split('|').map(str::trim).collect();
    if parts.len() < 6 || parts.iter().take(6).any(|p| p.is_empty()) {
        return Err(USAGE.to_string());
    }
    let referrer = parts.get(6).filter(|r| !r.is_empty()).map(|r| r.to_string());
    Ok(Command::Register(Box::new(NewMember {
        username: parts[0].to_string(),
        whatsapp: parts[1].to_string(),
        telegram: parts[2].to_string(),
        payment_method: parts[3].to_string(),
        payment_number: parts[4].to_string(),
        owner_name: parts[5].to_string(),
        referrer,
    })))
}

fn parse_editinfo(rest: &str) -> Result<Command, String> {
    const USAGE: &str = "Usage: /editinfo <username|whatsapp|telegram|payment_method|payment_number|owner_name> <new value>";
    let (field, value) = rest.split_once(char::is_whitespace).ok_or_else(|| USAGE.to_string())?;
    let field = match field {
        "username" => ProfileField::Username,
        "whatsapp" => ProfileField::Whatsapp,
        "telegram" => ProfileField::Telegram,
        "payment_method" => ProfileField::PaymentMethod,
        "payment_number" => ProfileField::PaymentNumber,
        "owner_name" => ProfileField::OwnerName,
        _ => return Err(USAGE.to_string()),
    };
    Ok(Command::EditInfo {
        field,
        value: value.trim().to_string(),
    })
}

fn parse_job_id(rest: &str) -> Result<i64, String> {
    rest.parse::<i64>()
        .map_err(|_| "Please give a numeric job id.".to_string())
}

fn parse_promote(rest: &str, kind: PromoKind) -> Result<Command, String> {
    if rest.is_empty() {
        return Err("Usage: /promote <link>".to_string());
    }
    Ok(Command::Promote {
        link: rest.to_string(),
        kind,
    })
}

fn parse_postjob(rest: &str) -> Result<Command, String> {
    const USAGE: &str = "Usage: /postjob <title>|<fee>|<description>";
    let parts: Vec<&str> = rest.splitn(3, '|').map(str::trim).collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(USAGE.to_string());
    }
    Ok(Command::PostJob {
        title: parts[0].to_string(),
        fee: parts[1].to_string(),
        description: parts[2].to_string(),
    })
}

fn parse_updatejob(rest: &str) -> Result<Command, String> {
    const USAGE: &str = "Usage: /updatejob <id> <active|closed|paid>";
    let (id, status) = rest.split_once(char::is_whitespace).ok_or_else(|| USAGE.to_string())?;
    let job_id = id.parse::<i64>().map_err(|_| USAGE.to_string())?;
    let status = JobStatus::parse(status.trim()).ok_or_else(|| USAGE.to_string())?;
    Ok(Command::UpdateJob { job_id, status })
}

fn parse_resetjob(rest: &str) -> Result<Command, String> {
    const USAGE: &str = "Usage: /resetjob <id> or /resetjob all";
    if rest.eq_ignore_ascii_case("all") {
        return Ok(Command::ResetJob(None));
    }
    rest.parse::<i64>()
        .map(|id| Command::ResetJob(Some(id)))
        .map_err(|_| USAGE.to_string())
}

fn parse_addpoint(rest: &str) -> Result<Command, String> {
    const USAGE: &str = "Usage: /addpoint <username> <points>";
    let (username, delta) = rest.split_once(char::is_whitespace).ok_or_else(|| USAGE.to_string())?;
    let delta = delta.trim().parse::<i64>().map_err(|_| USAGE.to_string())?;
    Ok(Command::AddPoints {
        username: username.to_string(),
        delta,
    })
}

fn parse_addbadge(rest: &str) -> Result<Command, String> {
    const USAGE: &str = "Usage: /addbadge <username> <badge name>";
    let (username, badge) = rest.split_once(char::is_whitespace).ok_or_else(|| USAGE.to_string())?;
    let badge = badge.trim();
    if badge.is_empty() {
        return Err(USAGE.to_string());
    }
    Ok(Command::AddBadge {
        username: username.to_string(),
        badge: badge.to_string(),
    })
}

fn parse_reset_target(rest: &str) -> Result<ResetTarget, String> {
    if rest.is_empty() {
        Err("Usage: <username> or all".to_string())
    } else if rest.eq_ignore_ascii_case("all") {
        Ok(ResetTarget::All)
    } else {
        Ok(ResetTarget::Member(rest.to_string()))
    }
}

/// Entry point: one inbound update, handled as its own task.
pub async fn handle_update(state: AppState, update: Update) {
    if let Some(callback) = update.callback_query {
        let Some(data) = callback.data else { return };
        handle_callback(&state, callback.from.id, &data).await;
        return;
    }

    let Some(message) = update.message else { return };
    let Some(sender) = message.from else { return };
    let Some(text) = message.text else { return };

    let chat_id = message.chat.id;
    let is_private = message.chat.is_private();

    match parse_command(&text) {
        Some(Ok(command)) => {
            handle_command(&state, chat_id, is_private, sender.id, command).await;
        }
        Some(Err(usage)) => {
            send(&state, chat_id, &usage).await;
        }
        None => {
            if is_private {
                handle_private_chat(&state, sender.id, &text).await;
            } else {
                handle_group_text(&state, chat_id, sender.id, &sender.display_name(), &text).await;
            }
        }
    }
}

async fn send(state: &AppState, chat_id: i64, text: &str) {
    if let Err(e) = state.transport.send_message(chat_id, text).await {
        warn!("reply to chat {chat_id} dropped: {e}");
    }
}

async fn handle_callback(state: &AppState, user_id: i64, data: &str) {
    if let Some(raw_id) = data.strip_prefix("apply_") {
        match raw_id.parse::<i64>() {
            Ok(job_id) => handle_apply(state, job_id, user_id).await,
            Err(_) => debug!("ignoring malformed apply callback: {data}"),
        }
    } else if let Some(promo_id) = data.strip_prefix("promote:") {
        handle_click(state, promo_id, user_id).await;
    } else {
        debug!("ignoring unknown callback: {data}");
    }
}

/// Apply button. All replies go to the member's DM so the group stays quiet.
async fn handle_apply(state: &AppState, job_id: i64, user_id: i64) {
    match applications::apply(&state.db, job_id, user_id, Utc::now()).await {
        Ok(receipt) => {
            let mut lines = vec![format!(
                "You are applicant #{} for job {} ({}). Good luck!",
                receipt.rank, receipt.job.id, receipt.job.title
            )];
            lines.push(format!("+{} points for applying.", ledger::APPLY_REWARD));
            lines.push(String::new());
            lines.push(format!("Applicants for job {}:", receipt.job.id));
            for (i, handle) in receipt.applicants.iter().enumerate() {
                lines.push(format!("{}. {}", i + 1, handle));
            }
            state.notifier.notify(user_id, &lines.join("\n")).await;

            for badge in &receipt.new_badges {
                state
                    .notifier
                    .notify(user_id, &format!("Congratulations! New badge earned: {}", badge.name()))
                    .await;
            }

            activity::log(
                &state.db,
                "job_apply",
                Some(user_id),
                &format!("applied to job {} as #{}", receipt.job.id, receipt.rank),
            )
            .await;
        }
        Err(ApplyError::NotRegistered) => {
            state
                .notifier
                .notify(user_id, "You are not registered yet. Use /register first.")
                .await;
        }
        Err(ApplyError::JobNotFound) => {
            state.notifier.notify(user_id, "That job no longer exists.").await;
        }
        Err(ApplyError::AlreadyApplied) => {
            state.notifier.notify(user_id, "You already applied to this job.").await;
        }
        Err(ApplyError::Store(e)) => {
            warn!("apply({job_id}, {user_id}) failed: {e}");
            state
                .notifier
                .notify(user_id, "Something went wrong, please try again.")
                .await;
        }
    }
}

async fn handle_click(state: &AppState, promo_id: &str, user_id: i64) {
    match promotions::click(&state.db, promo_id, user_id, Utc::now()).await {
        Ok(receipt) => {
            let owner = receipt.owner_username.as_deref().unwrap_or("a member");
            state
                .notifier
                .notify(
                    user_id,
                    &format!(
                        "Thanks for supporting {owner}!\nFollow this link: {}\n+{} point added. \
                         If the DM ever fails, your points are still added.",
                        receipt.link,
                        ledger::CLICK_REWARD
                    ),
                )
                .await;
            activity::log(
                &state.db,
                "promo_click",
                Some(user_id),
                &format!("clicked promotion {promo_id}"),
            )
            .await;
        }
        Err(ClickError::PromotionNotFound) => {
            state.notifier.notify(user_id, "This promotion no longer exists.").await;
        }
        Err(ClickError::AlreadyClicked) => {
            state
                .notifier
                .notify(user_id, "You already collected the point for this promotion.")
                .await;
        }
        Err(ClickError::Store(e)) => {
            warn!("click({promo_id}, {user_id}) failed: {e}");
            state
                .notifier
                .notify(user_id, "Something went wrong, please try again.")
                .await;
        }
    }
}

async fn handle_command(
    state: &AppState,
    chat_id: i64,
    is_private: bool,
    user_id: i64,
    command: Command,
) {
    match command {
        Command::Register(member) => {
            if !is_private {
                send(state, chat_id, "Registration works in DM only.").await;
                return;
            }
            handle_register(state, user_id, *member).await;
        }
        Command::EditInfo { field, value } => {
            match registration::update_profile(&state.db, user_id, field, &value).await {
                Ok(()) => send(state, chat_id, "Profile updated.").await,
                Err(ProfileError::NotRegistered) => {
                    send(state, chat_id, "You are not registered yet. Use /register first.").await;
                }
                Err(ProfileError::UsernameTaken) => {
                    send(state, chat_id, "That username is already taken.").await;
                }
                Err(ProfileError::Store(e)) => {
                    warn!("editinfo failed for {user_id}: {e}");
                    send(state, chat_id, "Something went wrong, please try again.").await;
                }
            }
        }
        Command::MyInfo => handle_myinfo(state, chat_id, user_id).await,
        Command::MyReferral => match registration::referral_summary(&state.db, user_id).await {
            Ok(summary) => {
                let mut lines = vec![
                    format!("Your referral code: {}", summary.code),
                    format!("Points: {}", summary.points),
                    format!("Members you invited: {}", summary.referred.len()),
                ];
                for (i, name) in summary.referred.iter().enumerate() {
                    lines.push(format!("{}. {}", i + 1, name));
                }
                lines.push(format!(
                    "Each successful referral pays {} points.",
                    ledger::REFERRAL_BONUS
                ));
                send(state, chat_id, &lines.join("\n")).await;
            }
            Err(ProfileError::NotRegistered) => {
                send(state, chat_id, "You are not registered yet. Use /register first.").await;
            }
            Err(e) => {
                warn!("myreferral failed for {user_id}: {e}");
                send(state, chat_id, "Something went wrong, please try again.").await;
            }
        },
        Command::Points => match registration::profile(&state.db, user_id, Utc::now()).await {
            Ok(view) => {
                send(
                    state,
                    chat_id,
                    &format!(
                        "Your points: {}\nEarn more: apply to jobs (+{}), referrals (+{}), \
                         promotion clicks (+{}).",
                        view.user.points,
                        ledger::APPLY_REWARD,
                        ledger::REFERRAL_BONUS,
                        ledger::CLICK_REWARD
                    ),
                )
                .await;
            }
            Err(ProfileError::NotRegistered) => {
                send(state, chat_id, "You are not registered yet. Use /register first.").await;
            }
            Err(e) => {
                warn!("points failed for {user_id}: {e}");
                send(state, chat_id, "Something went wrong, please try again.").await;
            }
        },
        Command::Leaderboard => handle_leaderboard(state, chat_id).await,
        Command::ListJobs => match admin::list_jobs(&state.db).await {
            Ok(jobs) if jobs.is_empty() => send(state, chat_id, "No jobs available yet.").await,
            Ok(jobs) => {
                let mut lines = vec!["Jobs:".to_string()];
                for job in jobs {
                    lines.push(format!("#{} | {} | {}", job.id, job.title, job.status.as_str()));
                }
                lines.push("Use /infojob <id> for details.".to_string());
                send(state, chat_id, &lines.join("\n")).await;
            }
            Err(e) => {
                warn!("listjob failed: {e}");
                send(state, chat_id, "Something went wrong, please try again.").await;
            }
        },
        Command::InfoJob(job_id) => match admin::job_by_id(&state.db, job_id).await {
            Ok(Some(job)) => {
                send(
                    state,
                    chat_id,
                    &format!(
                        "#{} {}\nFee: {}\n\n{}\n\nStatus: {}",
                        job.id, job.title, job.fee, job.description, job.status.as_str()
                    ),
                )
                .await;
            }
            Ok(None) => send(state, chat_id, "Job not found.").await,
            Err(e) => {
                warn!("infojob {job_id} failed: {e}");
                send(state, chat_id, "Something went wrong, please try again.").await;
            }
        },
        Command::Promote { link, kind } => {
            if !is_private {
                send(state, chat_id, "Promotions are posted from DM only.").await;
                return;
            }
            handle_promote(state, user_id, &link, kind).await;
        }
        Command::Followers(promo_id) => {
            match promotions::followers(&state.db, &promo_id, user_id).await {
                Ok(report) => {
                    let mut lines = vec![format!(
                        "Promotion {} has {} click(s):",
                        report.promo_id, report.total
                    )];
                    for handle in report.handles {
                        lines.push(format!(
                            "- {}",
                            handle.unwrap_or_else(|| "(deleted account)".to_string())
                        ));
                    }
                    send(state, chat_id, &lines.join("\n")).await;
                }
                Err(FollowersError::PromotionNotFound) => {
                    send(state, chat_id, "No promotion with that id.").await;
                }
                Err(FollowersError::NotOwner) => {
                    send(state, chat_id, "Only the promotion owner can view its clicks.").await;
                }
                Err(FollowersError::Store(e)) => {
                    warn!("followers {promo_id} failed: {e}");
                    send(state, chat_id, "Something went wrong, please try again.").await;
                }
            }
        }
        Command::StartAi => {
            if !is_private {
                send(state, chat_id, "Interactive AI chat works in DM only.").await;
                return;
            }
            state.sessions.start(user_id);
            send(
                state,
                chat_id,
                "AI assistant on. Just type your question; /stopai ends the session.",
            )
            .await;
            activity::log(&state.db, "ai_start", Some(user_id), "interactive session started").await;
        }
        Command::StopAi => {
            if state.sessions.stop(user_id) {
                send(state, chat_id, "AI assistant off. Use /startai to switch it back on.").await;
                activity::log(&state.db, "ai_stop", Some(user_id), "interactive session stopped").await;
            } else {
                send(state, chat_id, "No AI session is active.").await;
            }
        }
        Command::Ai(question) => handle_ai_question(state, chat_id, is_private, user_id, &question).await,
        Command::Summary => handle_summary(state, chat_id, is_private, user_id).await,
        Command::Help => send(state, chat_id, help_text()).await,

        // Admin surface from here down.
        Command::PostJob { .. }
        | Command::UpdateJob { .. }
        | Command::ResetJob(_)
        | Command::Applicants(_)
        | Command::ListMembers
        | Command::MemberInfo(_)
        | Command::PaymentInfo
        | Command::DeleteMember(_)
        | Command::ResetPoints(_)
        | Command::AddPoints { .. }
        | Command::AddBadge { .. }
        | Command::ResetApply(_)
        | Command::ResetBadge(_)
            if !state.config.is_admin(user_id) =>
        {
            send(state, chat_id, "This command is for admins.").await;
        }
        Command::PostJob { title, fee, description } => {
            handle_postjob(state, chat_id, &title, &fee, &description).await;
        }
        Command::UpdateJob { job_id, status } => {
            match admin::update_job_status(&state.db, job_id, status).await {
                Ok(job) => {
                    send(state, chat_id, &format!("Job {} is now {}.", job.id, job.status.as_str())).await;
                    if status == JobStatus::Paid {
                        send(
                            state,
                            state.config.group_chat_id,
                            &format!("Job {} has been paid out. Congrats to all applicants!", job.id),
                        )
                        .await;
                    }
                    activity::log(
                        &state.db,
                        "job_status",
                        Some(user_id),
                        &format!("job {} set to {}", job.id, job.status.as_str()),
                    )
                    .await;
                }
                Err(admin::AdminError::JobNotFound) => send(state, chat_id, "Job not found.").await,
                Err(e) => {
                    warn!("updatejob {job_id} failed: {e}");
                    send(state, chat_id, "Something went wrong, please try again.").await;
                }
            }
        }
        Command::ResetJob(target) => match admin::reset_jobs(&state.db, target).await {
            Ok(_) => {
                send(state, chat_id, "Done, job data removed.").await;
                activity::log(&state.db, "job_reset", Some(user_id), "jobs reset").await;
            }
            Err(admin::AdminError::JobNotFound) => send(state, chat_id, "Job not found.").await,
            Err(e) => {
                warn!("resetjob failed: {e}");
                send(state, chat_id, "Something went wrong, please try again.").await;
            }
        },
        Command::Applicants(job_id) => {
            match applications::applicants_of(&state.db, job_id).await {
                Ok(handles) if handles.is_empty() => {
                    send(state, chat_id, "No applicants yet.").await;
                }
                Ok(handles) => {
                    let mut lines = vec![format!("Applicants for job {job_id}:")];
                    for (i, handle) in handles.iter().enumerate() {
                        lines.push(format!("{}. {}", i + 1, handle));
                    }
                    send(state, chat_id, &lines.join("\n")).await;
                }
                Err(e) => {
                    warn!("applicants {job_id} failed: {e}");
                    send(state, chat_id, "Something went wrong, please try again.").await;
                }
            }
        }
        Command::ListMembers => match admin::list_members(&state.db).await {
            Ok(members) if members.is_empty() => send(state, chat_id, "No members yet.").await,
            Ok(members) => {
                let mut lines = vec![format!("{} member(s):", members.len())];
                for member in members {
                    lines.push(format!("- {} ({} pts)", member.username, member.points));
                }
                send(state, chat_id, &lines.join("\n")).await;
            }
            Err(e) => {
                warn!("listmember failed: {e}");
                send(state, chat_id, "Something went wrong, please try again.").await;
            }
        },
        Command::MemberInfo(username) => match admin::member_info(&state.db, &username).await {
            Ok(detail) => {
                let badges = if detail.badges.is_empty() {
                    "none".to_string()
                } else {
                    detail.badges.join(" | ")
                };
                send(
                    state,
                    chat_id,
                    &format!(
                        "{}\nPoints: {}\nApplications: {}\nBadges: {}\nReferrer: {}",
                        detail.user.username,
                        detail.user.points,
                        detail.total_applications,
                        badges,
                        detail.user.referrer.as_deref().unwrap_or("none")
                    ),
                )
                .await;
            }
            Err(admin::AdminError::UserNotFound) => {
                send(state, chat_id, "No member with that username.").await;
            }
            Err(e) => {
                warn!("memberinfo {username} failed: {e}");
                send(state, chat_id, "Something went wrong, please try again.").await;
            }
        },
        Command::PaymentInfo => match admin::list_members(&state.db).await {
            Ok(members) => {
                let mut lines = vec!["Payment details:".to_string()];
                for member in members {
                    lines.push(format!(
                        "- {}: {} {} ({})",
                        member.username, member.payment_method, member.payment_number, member.owner_name
                    ));
                }
                send(state, chat_id, &lines.join("\n")).await;
            }
            Err(e) => {
                warn!("paymentinfo failed: {e}");
                send(state, chat_id, "Something went wrong, please try again.").await;
            }
        },
        Command::DeleteMember(username) => match admin::delete_member(&state.db, &username).await {
            Ok(deleted_id) => {
                send(state, chat_id, &format!("Member {username} removed.")).await;
                activity::log(
                    &state.db,
                    "member_delete",
                    Some(deleted_id),
                    &format!("{username} deleted by admin"),
                )
                .await;
            }
            Err(admin::AdminError::UserNotFound) => {
                send(state, chat_id, "No member with that username.").await;
            }
            Err(e) => {
                warn!("delete {username} failed: {e}");
                send(state, chat_id, "Something went wrong, please try again.").await;
            }
        },
        Command::ResetPoints(username) => match admin::reset_points(&state.db, &username).await {
            Ok(reset_id) => {
                send(state, chat_id, &format!("Points reset for {username}.")).await;
                state.notifier.notify(reset_id, "Your points were reset by an admin.").await;
                activity::log(&state.db, "points_reset", Some(reset_id), &format!("points reset for {username}")).await;
            }
            Err(admin::AdminError::UserNotFound) => {
                send(state, chat_id, "No member with that username.").await;
            }
            Err(e) => {
                warn!("resetpoint {username} failed: {e}");
                send(state, chat_id, "Something went wrong, please try again.").await;
            }
        },
        Command::AddPoints { username, delta } => {
            match admin::add_points(&state.db, &username, delta).await {
                Ok(_) => send(state, chat_id, &format!("Added {delta} point(s) to {username}.")).await,
                Err(admin::AdminError::UserNotFound) => {
                    send(state, chat_id, "No member with that username.").await;
                }
                Err(e) => {
                    warn!("addpoint {username} failed: {e}");
                    send(state, chat_id, "Something went wrong, please try again.").await;
                }
            }
        }
        Command::AddBadge { username, badge } => {
            match admin::grant_badge(&state.db, &username, &badge, Utc::now()).await {
                Ok((member_id, true)) => {
                    send(state, chat_id, &format!("Badge '{badge}' granted to {username}.")).await;
                    state
                        .notifier
                        .notify(member_id, &format!("Congratulations! New badge earned: {badge}"))
                        .await;
                }
                Ok((_, false)) => {
                    send(state, chat_id, &format!("{username} already holds '{badge}'.")).await;
                }
                Err(admin::AdminError::UserNotFound) => {
                    send(state, chat_id, "No member with that username.").await;
                }
                Err(e) => {
                    warn!("addbadge {username} failed: {e}");
                    send(state, chat_id, "Something went wrong, please try again.").await;
                }
            }
        }
        Command::ResetApply(target) => match admin::reset_applications(&state.db, target).await {
            Ok(removed) => send(state, chat_id, &format!("Removed {removed} application(s).")).await,
            Err(admin::AdminError::UserNotFound) => {
                send(state, chat_id, "No member with that username.").await;
            }
            Err(e) => {
                warn!("resetapply failed: {e}");
                send(state, chat_id, "Something went wrong, please try again.").await;
            }
        },
        Command::ResetBadge(target) => match admin::reset_badges(&state.db, target).await {
            Ok(removed) => send(state, chat_id, &format!("Removed {removed} badge(s).")).await,
            Err(admin::AdminError::UserNotFound) => {
                send(state, chat_id, "No member with that username.").await;
            }
            Err(e) => {
                warn!("resetbadge failed: {e}");
                send(state, chat_id, "Something went wrong, please try again.").await;
            }
        },
    }
}

async fn handle_postjob(state: &AppState, chat_id: i64, title: &str, fee: &str, description: &str) {
    match admin::post_job(&state.db, title, fee, description, Utc::now()).await {
        Ok(job) => {
            send(state, chat_id, &format!("Job {} posted to the group.", job.id)).await;
            send(
                state,
                state.config.group_chat_id,
                &format!(
                    "NEW JOB #{}\n{}\nFee: {}\n\n{}\n\nStatus: active. Tap Apply to join. \
                     [apply_{}]",
                    job.id, job.title, job.fee, job.description, job.id
                ),
            )
            .await;
            activity::log(&state.db, "job_post", None, &format!("job {} posted", job.id)).await;
        }
        Err(e) => {
            warn!("postjob failed: {e}");
            send(state, chat_id, "Something went wrong, please try again.").await;
        }
    }
}

async fn handle_register(state: &AppState, user_id: i64, member: NewMember) {
    match registration::register(&state.db, user_id, member, Utc::now()).await {
        Ok(receipt) => {
            send(
                state,
                user_id,
                &format!(
                    "Registration complete!\nUsername: {}\nReferred by: {}\n\nUse /myinfo to \
                     review your data and /listjob to find work.",
                    receipt.user.username,
                    receipt.user.referrer.as_deref().unwrap_or("nobody")
                ),
            )
            .await;

            if let Some(bonus) = receipt.referral {
                state
                    .notifier
                    .notify(
                        bonus.referrer_id,
                        &format!(
                            "{} registered with your referral code! +{} points. You have now \
                             invited {} member(s).",
                            receipt.user.username,
                            ledger::REFERRAL_BONUS,
                            bonus.total_referrals
                        ),
                    )
                    .await;
            }

            activity::log(
                &state.db,
                "registration",
                Some(user_id),
                &format!("{} registered", receipt.user.username),
            )
            .await;
        }
        Err(RegisterError::AlreadyRegistered) => {
            send(state, user_id, "You are already registered. Use /editinfo to change your data.").await;
        }
        Err(RegisterError::UsernameTaken) => {
            send(state, user_id, "That username is already taken, pick another one.").await;
        }
        Err(RegisterError::UnknownReferrer(code)) => {
            send(
                state,
                user_id,
                &format!("Referral code '{code}' does not match any member. Check it and register again."),
            )
            .await;
        }
        Err(RegisterError::Store(e)) => {
            warn!("register failed for {user_id}: {e}");
            send(state, user_id, "Something went wrong, please try again.").await;
        }
    }
}

async fn handle_myinfo(state: &AppState, chat_id: i64, user_id: i64) {
    match registration::profile(&state.db, user_id, Utc::now()).await {
        Ok(view) => {
            let badges = if view.badges.is_empty() {
                "none yet".to_string()
            } else {
                view.badges.join(" | ")
            };
            send(
                state,
                chat_id,
                &format!(
                    "Your member data\nUsername: {}\nBadges: {}\nWhatsApp: {}\nTelegram: {}\n\
                     Payment: {} {} ({})\nPoints: {}\nReferred by: {}",
                    view.user.username,
                    badges,
                    view.user.whatsapp,
                    view.user.telegram,
                    view.user.payment_method,
                    view.user.payment_number,
                    view.user.owner_name,
                    view.user.points,
                    view.user.referrer.as_deref().unwrap_or("nobody")
                ),
            )
            .await;

            if let Some(badge) = view.new_badge {
                state
                    .notifier
                    .notify(user_id, &format!("Congratulations! New badge earned: {}", badge.name()))
                    .await;
            }
        }
        Err(ProfileError::NotRegistered) => {
            send(state, chat_id, "You are not registered yet. Use /register first.").await;
        }
        Err(e) => {
            warn!("myinfo failed for {user_id}: {e}");
            send(state, chat_id, "Something went wrong, please try again.").await;
        }
    }
}

async fn handle_leaderboard(state: &AppState, chat_id: i64) {
    match leaderboard::leaderboard(&state.db, Utc::now()).await {
        Ok(view) => {
            let mut lines = vec!["LEADERBOARD".to_string(), String::new(), "Top points:".to_string()];
            for (i, entry) in view.top_points.iter().enumerate() {
                lines.push(format!("{}. {} - {} pts", i + 1, entry.username, entry.points));
            }
            lines.push(String::new());
            lines.push("Top referrers:".to_string());
            for (i, entry) in view.top_referrers.iter().enumerate() {
                lines.push(format!("{}. {} - {} referral(s)", i + 1, entry.username, entry.referred));
            }
            send(state, chat_id, &lines.join("\n")).await;

            if let Some((user_id, badge)) = view.crowned {
                state
                    .notifier
                    .notify(user_id, &format!("Congratulations! New badge earned: {}", badge.name()))
                    .await;
            }
        }
        Err(e) => {
            warn!("leaderboard failed: {e}");
            send(state, chat_id, "Something went wrong, please try again.").await;
        }
    }
}

async fn handle_promote(state: &AppState, user_id: i64, link: &str, kind: PromoKind) {
    match promotions::promote(&state.db, user_id, link, kind, Utc::now()).await {
        Ok(receipt) => {
            send(
                state,
                user_id,
                &format!(
                    "Promotion posted! {} points deducted.\nPromotion id: {}\nCheck clicks with \
                     /followers {}",
                    receipt.cost, receipt.promotion.id, receipt.promotion.id
                ),
            )
            .await;

            let announcement = format!(
                "TIME TO SUPPORT!\n{} is growing their audience. Tap the button to follow \
                 and earn {} point.\n[promo:{}]",
                receipt.owner_username,
                ledger::CLICK_REWARD,
                receipt.promotion.id
            );
            match state.transport.send_message(state.config.group_chat_id, &announcement).await {
                Ok(message_id) => {
                    let now = Utc::now();
                    let cleanup = scheduler::schedule(
                        &state.db,
                        TaskAction::DeleteMessage,
                        state.config.group_chat_id,
                        message_id,
                        now + Duration::hours(PROMO_DELETE_AFTER_HOURS),
                    )
                    .await;
                    if let Err(e) = cleanup {
                        warn!("failed to schedule promo cleanup: {e}");
                    }

                    if kind == PromoKind::Special {
                        if let Err(e) = state.transport.pin_message(state.config.group_chat_id, message_id).await {
                            warn!("failed to pin special promotion: {e}");
                        }
                        let unpin = scheduler::schedule(
                            &state.db,
                            TaskAction::UnpinMessage,
                            state.config.group_chat_id,
                            message_id,
                            now + Duration::hours(PROMO_UNPIN_AFTER_HOURS),
                        )
                        .await;
                        if let Err(e) = unpin {
                            warn!("failed to schedule promo unpin: {e}");
                        }
                    }
                }
                Err(e) => warn!("failed to announce promotion: {e}"),
            }

            activity::log(
                &state.db,
                "promotion",
                Some(user_id),
                &format!("posted promotion {}", receipt.promotion.id),
            )
            .await;
        }
        Err(PromoteError::NotRegistered) => {
            send(state, user_id, "You are not registered yet. Use /register first.").await;
        }
        Err(PromoteError::InsufficientPoints { have, need }) => {
            send(
                state,
                user_id,
                &format!("Not enough points: you have {have}, this promotion costs {need}."),
            )
            .await;
        }
        Err(PromoteError::Store(e)) => {
            warn!("promote failed for {user_id}: {e}");
            send(state, user_id, "Something went wrong, please try again.").await;
        }
    }
}

async fn handle_ai_question(
    state: &AppState,
    chat_id: i64,
    is_private: bool,
    user_id: i64,
    question: &str,
) {
    if !is_private && !is_registered(state, user_id).await {
        send(state, chat_id, "Register first to use the AI: /register in DM.").await;
        return;
    }

    match ai_chat::answer(&state.llm, question).await {
        Ok(reply) => {
            send(state, chat_id, &format!("AI Assistant:\n\n{reply}")).await;
            if !is_private {
                let mut conn = match state.db.acquire().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("ai reward skipped: {e}");
                        return;
                    }
                };
                if let Err(e) = ledger::add_points(&mut conn, user_id, ledger::AI_CHAT_REWARD).await {
                    warn!("ai reward failed for {user_id}: {e}");
                }
            }
            activity::log(&state.db, "ai_request", Some(user_id), "answered an AI query").await;
        }
        Err(e) => {
            warn!("ai request failed for {user_id}: {e}");
            send(state, chat_id, "The AI could not answer right now, try again shortly.").await;
        }
    }
}

async fn handle_summary(state: &AppState, chat_id: i64, is_private: bool, user_id: i64) {
    if is_private {
        send(state, chat_id, "Summaries only work in group chats.").await;
        return;
    }
    if !is_registered(state, user_id).await {
        send(state, chat_id, "Register first to use summaries: /register in DM.").await;
        return;
    }

    match ai_chat::summarize(&state.db, &state.llm, chat_id).await {
        Ok(summary) => {
            send(
                state,
                chat_id,
                &format!(
                    "Conversation summary\n\n{}\n\n(based on the last {} messages)",
                    summary.text, summary.message_count
                ),
            )
            .await;
            // Scoped so the single pooled connection is back before the log write.
            {
                let mut conn = match state.db.acquire().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("summary reward skipped: {e}");
                        return;
                    }
                };
                if let Err(e) = ledger::add_points(&mut conn, user_id, ledger::SUMMARY_REWARD).await {
                    warn!("summary reward failed for {user_id}: {e}");
                }
            }
            activity::log(&state.db, "summary", Some(user_id), "generated a group summary").await;
        }
        Err(ai_chat::SummaryError::NothingToSummarize) => {
            send(state, chat_id, "Not enough messages to summarize yet.").await;
        }
        Err(e) => {
            warn!("summary failed in chat {chat_id}: {e}");
            send(state, chat_id, "Could not build a summary right now, try again shortly.").await;
        }
    }
}

/// Private non-command text: an answer when an AI session is active,
/// otherwise silence (matching button-driven onboarding).
async fn handle_private_chat(state: &AppState, user_id: i64, text: &str) {
    if !state.sessions.is_active(user_id) {
        return;
    }
    match ai_chat::answer(&state.llm, text).await {
        Ok(reply) => send(state, user_id, &format!("AI Assistant:\n\n{reply}")).await,
        Err(e) => {
            warn!("interactive ai failed for {user_id}: {e}");
            send(state, user_id, "The AI could not answer right now, try again shortly.").await;
        }
    }
}

/// Group non-command text: capture for summaries, and pay the activity point
/// for substantive messages from registered members.
async fn handle_group_text(state: &AppState, chat_id: i64, user_id: i64, username: &str, text: &str) {
    if let Err(e) =
        ai_chat::save_group_message(&state.db, chat_id, user_id, username, text, Utc::now()).await
    {
        warn!("group message capture failed: {e}");
    }

    if text.chars().count() > ACTIVITY_MIN_CHARS && is_registered(state, user_id).await {
        let mut conn = match state.db.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("activity reward skipped: {e}");
                return;
            }
        };
        if let Err(e) = ledger::add_points(&mut conn, user_id, 1).await {
            warn!("activity reward failed for {user_id}: {e}");
        }
    }
}

async fn is_registered(state: &AppState, user_id: i64) -> bool {
    match sqlx::query_scalar::<_, i64>("SELECT user_id FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await
    {
        Ok(found) => found.is_some(),
        Err(e) => {
            warn!("registration check failed for {user_id}: {e}");
            false
        }
    }
}

fn help_text() -> &'static str {
    "Member commands:\n\
     /register <username>|<whatsapp>|<telegram>|<payment method>|<payment number>|<account holder>[|referrer]\n\
     /editinfo <field> <value>\n\
     /myinfo, /myreferral, /points, /leaderboard\n\
     /listjob, /infojob <id>\n\
     /promote <link>, /promote_special <link>, /followers <promo id>\n\
     /startai, /stopai, /ai <question>, /summary"
}
