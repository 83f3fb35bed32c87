pub mod account;
pub mod client;
pub mod conference;
pub mod email;
pub mod job;
pub mod template;
pub mod thread;

pub use account::{EmailAccount, SyncStatus};
pub use client::{Client, ClientStatus};
pub use conference::Conference;
pub use email::{Email, EmailDirection};
pub use job::{FollowUpJob, JobSettings, JobStage, JobStatus};
pub use template::EmailTemplate;
pub use thread::MailThread;
