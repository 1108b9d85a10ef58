use log::info;
use mongodb::{
    bson::doc, options::ClientOptions, options::IndexOptions, Client, Collection, Database,
    IndexModel,
};

use crate::models::{ChatMessage, InviteCode, Organization, Profile, SleepLog};

pub const SLEEP_LOGS: &str = "sleep_logs";
pub const CHAT_MESSAGES: &str = "chat_messages";
pub const ORGANIZATIONS: &str = "organizations";
pub const INVITE_CODES: &str = "org_invite_codes";
pub const PROFILES: &str = "profiles";

pub struct MongoDB {
    pub db: Database,
}

impl MongoDB {
    /// Parses the connection string and builds a client. No round trip is
    /// made until the first operation.
    pub async fn init(uri: &str, db_name: &str) -> mongodb::error::Result<Self> {
        let mut client_options = ClientOptions::parse(uri).await?;
        client_options.app_name = Some("zeno".to_string());
        let client = Client::with_options(client_options)?;
        let db = client.database(db_name);
        Ok(MongoDB { db })
    }

    /// Unique constraints the handlers rely on.
    pub async fn ensure_indexes(&self) -> mongodb::error::Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.sleep_logs()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "log_date": -1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.chat_messages()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "created_at": -1 })
                    .build(),
            )
            .await?;
        self.invite_codes()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "code": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.profiles()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.profiles()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "organization_id": 1 })
                    .build(),
            )
            .await?;

        info!("indexes ensured on database {}", self.db.name());
        Ok(())
    }

    pub fn sleep_logs(&self) -> Collection<SleepLog> {
        self.db.collection(SLEEP_LOGS)
    }

    pub fn chat_messages(&self) -> Collection<ChatMessage> {
        self.db.collection(CHAT_MESSAGES)
    }

    pub fn organizations(&self) -> Collection<Organization> {
        self.db.collection(ORGANIZATIONS)
    }

    pub fn invite_codes(&self) -> Collection<InviteCode> {
        self.db.collection(INVITE_CODES)
    }

    pub fn profiles(&self) -> Collection<Profile> {
        self.db.collection(PROFILES)
    }
}
