pub mod client;
pub mod metainfo;

pub use client::{AddOutcome, ClientError, Credentials, DownloadClient, TransmissionClient};
pub use metainfo::{FileMetainfoReader, InfoHash, MetainfoError, MetainfoReader};
