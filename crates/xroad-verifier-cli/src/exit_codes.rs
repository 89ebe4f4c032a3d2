//! Process exit codes. Part of the CLI contract.
//!
//! Verification failures exit with
//! [`VerificationError::exit_code`](xroad_verifier::VerificationError::exit_code):
//!
//! | code | meaning |
//! |------|---------|
//! | 1 | trust configuration fault (e.g. no TSP certificates) |
//! | 3 | evidence structurally broken |
//! | 4 | evidence does not prove the claim |
//! | 5 | certificate chain or revocation failure |

pub const SUCCESS: i32 = 0;
pub const INPUT_ERROR: i32 = 2; // Unreadable files, bad arguments, bad trust configuration
