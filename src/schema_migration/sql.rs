//! Precompiled SQL programs embedded as text, one constant per asset named
//! in §4.D/E/F ("lmv.sql", "up.sql"/"down.sql", "schema.sql", "settle.sql",
//! "dev.sql"/"prod.sql").

pub const MIG1_LMV_MINOR_0: &str = include_str!("sql/mig1/lmv_0.sql");
pub const MIG1_LMV_MINOR_1: &str = include_str!("sql/mig1/lmv_1.sql");
pub const MIG1_SCHEMA: &str = include_str!("sql/mig1/schema.sql");
pub const MIG1_SETTLE: &str = include_str!("sql/mig1/settle.sql");
pub const MIG1_DEV: &str = include_str!("sql/mig1/dev.sql");
pub const MIG1_PROD: &str = include_str!("sql/mig1/prod.sql");

pub const MIG2_LMV_MINOR_0: &str = include_str!("sql/mig2/lmv_0.sql");
pub const MIG2_SCHEMA: &str = include_str!("sql/mig2/schema.sql");
pub const MIG2_SETTLE: &str = include_str!("sql/mig2/settle.sql");
pub const MIG2_DEV: &str = include_str!("sql/mig2/dev.sql");
pub const MIG2_PROD: &str = include_str!("sql/mig2/prod.sql");

pub const STEP_UP_1_TO_2: &str = include_str!("sql/step/up_1_2.sql");
pub const STEP_DOWN_2_TO_1: &str = include_str!("sql/step/down_2_1.sql");

/// Latest supported minor of major 1.
pub const MIG1_LATEST_MINOR: u16 = 1;
/// Latest supported minor of major 2.
pub const MIG2_LATEST_MINOR: u16 = 0;

pub fn lmv_program(major: u16, minor: u16) -> Option<&'static str> {
    match (major, minor) {
        (1, 0) => Some(MIG1_LMV_MINOR_0),
        (1, 1) => Some(MIG1_LMV_MINOR_1),
        (2, 0) => Some(MIG2_LMV_MINOR_0),
        _ => None,
    }
}
