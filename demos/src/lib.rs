//! Shared fixtures for the demo binaries.

use bytes::Bytes;
use term_ingest::storage::{StorageGateway, StorageResult};

/// Match extracts for three days of fixtures; the first day is already in
/// the watermark seeded by [`seed_source`].
pub const SAMPLE_OBJECTS: &[(&str, &str)] = &[
    (
        "football-2023-03-18/matches.csv",
        "HomeTeam,AwayTeam,FTHG,FTAG\nArsenal,Crystal Palace,4,1\n",
    ),
    (
        "football-2023-03-19/early.csv",
        "HomeTeam,AwayTeam,FTHG,FTAG\nBrighton,Grimsby,5,0\n",
    ),
    (
        "football-2023-03-19/late.csv",
        "HomeTeam,AwayTeam,FTHG,FTAG\nMan United,Fulham,3,1\n",
    ),
    (
        "football-2023-03-20/matches.csv",
        "HomeTeam,AwayTeam,FTHG,FTAG\nSheffield United,Blackburn,3,2\n",
    ),
    ("football-2023-03-20/_SUCCESS", ""),
    (
        "processed_data.csv",
        "partition_id,processed_at\n2023-03-18,2023-03-18T23:00:00Z\n",
    ),
];

/// Writes [`SAMPLE_OBJECTS`] into `store`.
pub async fn seed_source(store: &dyn StorageGateway) -> StorageResult<()> {
    for (key, contents) in SAMPLE_OBJECTS {
        store
            .put(key, Bytes::copy_from_slice(contents.as_bytes()))
            .await?;
    }
    Ok(())
}
