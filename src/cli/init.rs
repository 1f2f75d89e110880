use serde_json::json;

use crate::config::Config;
use crate::db::connection;
use crate::error::CadenceError;
use crate::output;

pub fn run(user: Option<&str>, json_output: bool) -> i32 {
    super::finish(run_init(user, json_output), json_output)
}

fn run_init(user: Option<&str>, json_output: bool) -> Result<i32, CadenceError> {
    let db_path = connection::init_db()?;
    let mut config = Config::load()?;
    if let Some(user) = user {
        if user.trim().is_empty() {
            return Err(CadenceError::validation("User id must not be empty"));
        }
        config.user_id = user.to_string();
    }
    let config_path = config.save()?;

    if json_output {
        output::json::print(&output::json::success(json!({
            "path": db_path.to_string_lossy(),
            "config": config_path.to_string_lossy(),
            "user_id": config.user_id
        })));
    } else {
        println!("Initialized cadence at {} (user: {})", db_path.display(), config.user_id);
    }
    Ok(0)
}
