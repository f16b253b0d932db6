mod settings;

pub use settings::{
    ApiConfig, AttachmentConfig, CacheConfig, DatabaseConfig, LoggingConfig, MailConfig,
    RedisConfig, ServerConfig, Settings, SmtpConfig, StoreConfig,
};
