mod backup;
mod jobs;
mod logs;
mod remote;
mod restore;
mod schedule;

// Backup commands
pub use backup::{run_backup, run_cleanup, run_list_artifacts};

// Restore commands
pub use restore::run_restore;

// Audit log commands
pub use logs::show_logs;

// Job commands
pub use jobs::{JobChanges, create_job, list_jobs, show_job, show_job_next_runs, update_job};

// Schedule commands
pub use schedule::{list_schedules, run_scheduler, validate_schedule};

// Remote storage commands
pub use remote::{
    authorize, check_remote, create_folder, list_folders, list_remote_files, show_auth_url,
    show_quota,
};
