use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use bday_db::{Database, DbError, DbResult};
use bday_types::api::{Command, CommandRequest, Reply};
use bday_types::models::{BirthdayDate, ChatId, ParseDateError, UserId};

use crate::platform::ChatPlatform;
use crate::policy::Policy;

pub const DEFAULT_CONGRATULATION: &str = "С днем рождения! 🎉";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("user {actor_id} may not act on behalf of user {target_id}")]
    Forbidden { actor_id: UserId, target_id: UserId },

    #[error("{0}")]
    Validation(String),

    #[error("user {user_id} is not a member of chat {chat_id}")]
    UnknownMember { user_id: UserId, chat_id: ChatId },

    #[error("database unavailable: {0}")]
    Unavailable(#[source] DbError),

    #[error(transparent)]
    Store(DbError),

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<DbError> for CommandError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Validation(msg) => CommandError::Validation(msg),
            e @ (DbError::Connection { .. } | DbError::LockPoisoned) => CommandError::Unavailable(e),
            e => CommandError::Store(e),
        }
    }
}

impl From<ParseDateError> for CommandError {
    fn from(err: ParseDateError) -> Self {
        CommandError::Validation(err.to_string())
    }
}

impl CommandError {
    /// Text to post in the chat when the command fails.
    pub fn reply_text(&self) -> String {
        match self {
            CommandError::Forbidden { .. } => {
                "Ha-ha, clever! But you can't do that for other users. Try again without user id.".into()
            }
            CommandError::Validation(msg) if msg.contains("DD.MM") || msg.contains("out of range") => {
                "Invalid date format. Please try again in format \"DD.MM\".".into()
            }
            CommandError::Validation(msg) => msg.clone(),
            CommandError::UnknownMember { user_id, .. } => {
                format!("Sorry, but I can't get user ({user_id}) info. Check id and try again.")
            }
            CommandError::Unavailable(_) | CommandError::Store(_) | CommandError::Task(_) => {
                "Something went wrong on my side, please try again later.".into()
            }
        }
    }
}

pub struct Settings {
    pub owner_id: Option<UserId>,
    pub default_congratulation: String,
    pub platform_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            owner_id: None,
            default_congratulation: DEFAULT_CONGRATULATION.into(),
            platform_timeout: Duration::from_secs(5),
        }
    }
}

/// Runs parsed chat commands: authorization first, then the store.
pub struct Orchestrator {
    db: Arc<Database>,
    platform: Arc<dyn ChatPlatform>,
    policy: Policy,
    default_congratulation: String,
    platform_timeout: Duration,
}

impl Orchestrator {
    pub fn new(db: Arc<Database>, platform: Arc<dyn ChatPlatform>, settings: Settings) -> Self {
        let policy = Policy::new(settings.owner_id, platform.clone(), settings.platform_timeout);
        Self {
            db,
            platform,
            policy,
            default_congratulation: settings.default_congratulation,
            platform_timeout: settings.platform_timeout,
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Run a store call on the blocking pool. Opening the connection may sleep
    /// between retries, which must not stall the runtime.
    async fn store<F, T>(&self, f: F) -> Result<T, CommandError>
    where
        F: FnOnce(&Database) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                CommandError::Task(e)
            })?;
        Ok(result?)
    }

    pub async fn handle(&self, req: CommandRequest) -> Result<Reply, CommandError> {
        debug!(
            "Running {} from user {} in chat {}",
            req.command.name(),
            req.actor_id,
            req.chat_id
        );
        let CommandRequest {
            actor_id,
            actor_name,
            chat_id,
            command,
        } = req;

        match command {
            Command::SetBirthday { target_id, date } => {
                self.set_birthday(actor_id, &actor_name, chat_id, target_id, &date)
                    .await
            }
            Command::DeleteBirthday { target_id } => {
                let target = self.resolve_target(actor_id, chat_id, target_id).await?;
                self.store(move |db| db.delete_birthday(target, chat_id)).await?;
                Ok(Reply::text(format!("Birthday was deleted for user: {target}")))
            }
            Command::SetCongratulation { target_id, text } => {
                let target = self.resolve_target(actor_id, chat_id, target_id).await?;
                let stored = text.clone();
                self.store(move |db| db.upsert_congratulation(target, chat_id, &stored))
                    .await?;
                Ok(Reply::text(format!(
                    "Congratulation text for user {target} was updated to: \"{text}\" for chat {chat_id}"
                )))
            }
            Command::ShowCongratulation { target_id } => {
                let target = self.resolve_target(actor_id, chat_id, target_id).await?;
                let text = self.congratulation_text(target, chat_id).await?;
                Ok(Reply::text(format!(
                    "The congratulation for user {target} is: \"{text}\""
                )))
            }
            Command::CongratulateToday => {
                let today = chrono::Local::now().date_naive();
                self.congratulate_on(chat_id, today).await
            }
            Command::Ban { target_id } => self.ban(actor_id, chat_id, target_id).await,
        }
    }

    /// One message per non-banned user of `chat_id` born on `date`'s day and month.
    pub async fn congratulate_on(&self, chat_id: ChatId, date: NaiveDate) -> Result<Reply, CommandError> {
        let day = BirthdayDate::of(&date);
        let found = self
            .store(move |db| {
                db.users_with_birthday_on(day.day, day.month, chat_id)?
                    .into_iter()
                    .map(|user| {
                        let text = db.congratulation_for(user.user_id, chat_id)?;
                        Ok((user, text))
                    })
                    .collect::<DbResult<Vec<_>>>()
            })
            .await?;
        debug!("Found {} users with birthdays on {} in chat {}", found.len(), day, chat_id);

        if found.is_empty() {
            return Ok(Reply::text("There are no registered birthdays today"));
        }

        let messages = found
            .into_iter()
            .map(|(user, text)| {
                let text = text.as_deref().unwrap_or(&self.default_congratulation);
                format!("@{} {}", user.display_name, text)
            })
            .collect();
        Ok(Reply { messages })
    }

    async fn set_birthday(
        &self,
        actor_id: UserId,
        actor_name: &str,
        chat_id: ChatId,
        target_id: Option<UserId>,
        date: &str,
    ) -> Result<Reply, CommandError> {
        let date: BirthdayDate = date.parse()?;
        let target = self.resolve_target(actor_id, chat_id, target_id).await?;

        let name = if target == actor_id {
            actor_name.to_string()
        } else {
            self.member_name(chat_id, target).await?
        };

        let registration = self
            .store(move |db| db.register_birthday(target, chat_id, &name, date))
            .await?;
        info!(
            "Saved birthday {} for user {} in chat {} ({:?})",
            date, target, chat_id, registration
        );

        Ok(Reply::text(format!(
            "Birthday for user {target} ({date}) was saved!\n\
             p.s. if you want to change default congratulation message, \
             you can use /set_congrat_text command"
        )))
    }

    async fn ban(&self, actor_id: UserId, chat_id: ChatId, target_id: UserId) -> Result<Reply, CommandError> {
        if target_id == actor_id {
            return Err(CommandError::Validation("You can't ban yourself.".into()));
        }
        let target = self.resolve_target(actor_id, chat_id, Some(target_id)).await?;

        if self.store(move |db| db.ban_user(target)).await? {
            info!("User {} banned by {}", target, actor_id);
            Ok(Reply::text(format!("User {target} was banned")))
        } else {
            Ok(Reply::text(format!("User {target} is not registered")))
        }
    }

    /// The user the command applies to. An explicit target other than the
    /// actor must pass the policy.
    async fn resolve_target(
        &self,
        actor_id: UserId,
        chat_id: ChatId,
        target_id: Option<UserId>,
    ) -> Result<UserId, CommandError> {
        let Some(target_id) = target_id else {
            return Ok(actor_id);
        };

        if self.policy.can_act_on_behalf_of(actor_id, chat_id, target_id).await {
            Ok(target_id)
        } else {
            warn!(
                "User {} tried to act on behalf of {} in chat {}",
                actor_id, target_id, chat_id
            );
            Err(CommandError::Forbidden { actor_id, target_id })
        }
    }

    async fn member_name(&self, chat_id: ChatId, user_id: UserId) -> Result<String, CommandError> {
        let lookup = tokio::time::timeout(self.platform_timeout, self.platform.member_name(chat_id, user_id));
        match lookup.await {
            Ok(Ok(Some(name))) => Ok(name),
            Ok(Ok(None)) => {
                warn!("User {} is not in chat {}", user_id, chat_id);
                Err(CommandError::UnknownMember { user_id, chat_id })
            }
            Ok(Err(e)) => {
                error!("Failed to fetch name of user {} in chat {}: {}", user_id, chat_id, e);
                Err(CommandError::UnknownMember { user_id, chat_id })
            }
            Err(_) => {
                error!("Timed out fetching name of user {} in chat {}", user_id, chat_id);
                Err(CommandError::UnknownMember { user_id, chat_id })
            }
        }
    }

    async fn congratulation_text(&self, user_id: UserId, chat_id: ChatId) -> Result<String, CommandError> {
        let text = self
            .store(move |db| db.congratulation_for(user_id, chat_id))
            .await?;
        Ok(text.unwrap_or_else(|| self.default_congratulation.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakePlatform;
    use bday_db::RetryPolicy;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const CHAT: ChatId = 7;
    const OWNER: UserId = 1;
    const ADMIN: UserId = 50;

    struct Harness {
        _dir: TempDir,
        platform: Arc<FakePlatform>,
        orchestrator: Orchestrator,
    }

    fn harness(platform: FakePlatform) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let retry = RetryPolicy {
            attempts: 1,
            delay: Duration::ZERO,
        };
        let db = Arc::new(Database::open(&dir.path().join("bday.db"), retry).unwrap());
        let platform = Arc::new(platform);
        let settings = Settings {
            owner_id: Some(OWNER),
            default_congratulation: "Happy birthday!".into(),
            platform_timeout: Duration::from_millis(200),
        };
        let orchestrator = Orchestrator::new(db, platform.clone(), settings);
        Harness {
            _dir: dir,
            platform,
            orchestrator,
        }
    }

    fn default_platform() -> FakePlatform {
        FakePlatform {
            members: HashMap::from([((CHAT, 300), "petr".to_string())]),
            ..FakePlatform::with_admins(CHAT, &[ADMIN])
        }
    }

    fn request(actor_id: UserId, command: Command) -> CommandRequest {
        CommandRequest {
            actor_id,
            actor_name: format!("user{actor_id}"),
            chat_id: CHAT,
            command,
        }
    }

    fn date(day: u32, month: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    #[tokio::test]
    async fn self_registration_then_update() {
        let h = harness(default_platform());
        let o = &h.orchestrator;

        let reply = o
            .handle(request(100, Command::SetBirthday { target_id: None, date: "05.03".into() }))
            .await
            .unwrap();
        assert!(reply.messages[0].starts_with("Birthday for user 100 (05.03) was saved!"));
        assert!(o.db().user_exists(100).unwrap());
        assert!(o.db().is_registered_in_chat(100, CHAT).unwrap());

        let today = o.congratulate_on(CHAT, date(5, 3)).await.unwrap();
        assert_eq!(today.messages, vec!["@user100 Happy birthday!"]);

        o.handle(request(100, Command::SetBirthday { target_id: None, date: "6.3".into() }))
            .await
            .unwrap();
        assert_eq!(
            o.congratulate_on(CHAT, date(5, 3)).await.unwrap().messages,
            vec!["There are no registered birthdays today"]
        );
        assert_eq!(o.congratulate_on(CHAT, date(6, 3)).await.unwrap().messages.len(), 1);
        // Self-service never consults the admin list.
        assert_eq!(h.platform.admin_calls(), 0);
    }

    #[tokio::test]
    async fn invalid_date_is_rejected_before_touching_the_store() {
        let h = harness(default_platform());

        let err = h
            .orchestrator
            .handle(request(100, Command::SetBirthday { target_id: None, date: "5 march".into() }))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Validation(_)));
        assert_eq!(err.reply_text(), "Invalid date format. Please try again in format \"DD.MM\".");
        assert!(!h.orchestrator.db().user_exists(100).unwrap());
    }

    #[tokio::test]
    async fn non_admin_cannot_set_someone_elses_congratulation() {
        let h = harness(default_platform());
        let o = &h.orchestrator;

        let err = o
            .handle(request(
                200,
                Command::SetCongratulation { target_id: Some(300), text: "gotcha".into() },
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::Forbidden { actor_id: 200, target_id: 300 }));
        assert_eq!(o.db().congratulation_for(300, CHAT).unwrap(), None);
        assert!(!o.db().user_exists(300).unwrap());
    }

    #[tokio::test]
    async fn admin_registers_birthday_for_member_by_platform_name() {
        let h = harness(default_platform());
        let o = &h.orchestrator;

        o.handle(request(ADMIN, Command::SetBirthday { target_id: Some(300), date: "17.11".into() }))
            .await
            .unwrap();

        let user = o.db().get_user(300).unwrap().unwrap();
        assert_eq!(user.display_name, "petr");
        assert_eq!(
            o.db().birthday_for(300, CHAT).unwrap(),
            Some(BirthdayDate { day: 17, month: 11 })
        );
    }

    #[tokio::test]
    async fn owner_targeting_unknown_member_fails_cleanly() {
        let h = harness(default_platform());

        let err = h
            .orchestrator
            .handle(request(OWNER, Command::SetBirthday { target_id: Some(999), date: "01.01".into() }))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::UnknownMember { user_id: 999, chat_id: CHAT }));
        assert!(!h.orchestrator.db().user_exists(999).unwrap());
    }

    #[tokio::test]
    async fn custom_congratulation_is_used_in_announcements() {
        let h = harness(default_platform());
        let o = &h.orchestrator;
        o.handle(request(100, Command::SetBirthday { target_id: None, date: "05.03".into() }))
            .await
            .unwrap();

        let shown = o
            .handle(request(100, Command::ShowCongratulation { target_id: None }))
            .await
            .unwrap();
        assert_eq!(shown.messages, vec!["The congratulation for user 100 is: \"Happy birthday!\""]);

        o.handle(request(
            100,
            Command::SetCongratulation { target_id: None, text: "Party  time!".into() },
        ))
        .await
        .unwrap();

        assert_eq!(
            o.congratulate_on(CHAT, date(5, 3)).await.unwrap().messages,
            vec!["@user100 Party  time!"]
        );
    }

    #[tokio::test]
    async fn congratulation_for_unregistered_user_is_a_store_error() {
        let h = harness(default_platform());

        let err = h
            .orchestrator
            .handle(request(100, Command::SetCongratulation { target_id: None, text: "hi".into() }))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Store(DbError::Referential { user_id: 100 })));
    }

    #[tokio::test]
    async fn admin_deletes_another_users_birthday() {
        let h = harness(default_platform());
        let o = &h.orchestrator;
        o.handle(request(100, Command::SetBirthday { target_id: None, date: "05.03".into() }))
            .await
            .unwrap();

        let reply = o
            .handle(request(ADMIN, Command::DeleteBirthday { target_id: Some(100) }))
            .await
            .unwrap();
        assert_eq!(reply.messages, vec!["Birthday was deleted for user: 100"]);
        assert_eq!(o.db().birthday_for(100, CHAT).unwrap(), None);

        // Deleting again is harmless.
        o.handle(request(100, Command::DeleteBirthday { target_id: None }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn banned_user_drops_out_of_announcements() {
        let h = harness(default_platform());
        let o = &h.orchestrator;
        o.handle(request(100, Command::SetBirthday { target_id: None, date: "05.03".into() }))
            .await
            .unwrap();

        let err = o
            .handle(request(200, Command::Ban { target_id: 100 }))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Forbidden { .. }));

        let reply = o.handle(request(OWNER, Command::Ban { target_id: 100 })).await.unwrap();
        assert_eq!(reply.messages, vec!["User 100 was banned"]);
        assert_eq!(
            o.congratulate_on(CHAT, date(5, 3)).await.unwrap().messages,
            vec!["There are no registered birthdays today"]
        );
    }

    #[tokio::test]
    async fn cannot_ban_yourself() {
        let h = harness(default_platform());

        let err = h
            .orchestrator
            .handle(request(ADMIN, Command::Ban { target_id: ADMIN }))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Validation(_)));
    }

    #[tokio::test]
    async fn reconnect_retries_leave_the_runtime_free() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        let retry = RetryPolicy {
            attempts: 4,
            delay: Duration::from_millis(100),
        };
        let db = Arc::new(Database::open(&data.join("bday.db"), retry).unwrap());
        db.close();
        std::fs::remove_dir_all(&data).unwrap();
        let orchestrator = Orchestrator::new(db, Arc::new(default_platform()), Settings::default());

        // #[tokio::test] runs on a single thread, so the ticker only advances
        // while the store call is off that thread.
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        let err = orchestrator
            .handle(request(100, Command::DeleteBirthday { target_id: None }))
            .await
            .unwrap_err();
        ticker.abort();

        assert!(matches!(err, CommandError::Unavailable(DbError::Connection { attempts: 4, .. })), "{err}");
        assert!(ticks.load(Ordering::SeqCst) >= 5, "runtime stalled during reconnect");
    }

    #[test]
    fn connection_failures_map_to_unavailable() {
        let err: CommandError = DbError::LockPoisoned.into();
        assert!(matches!(err, CommandError::Unavailable(_)));

        let err: CommandError = DbError::Referential { user_id: 1 }.into();
        assert!(matches!(err, CommandError::Store(_)));
    }
}
