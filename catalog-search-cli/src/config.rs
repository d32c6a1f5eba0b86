use crate::error::{CliResult, IntoCliResult};
use crate::exit_codes::EXIT_SUCCESS;
use catalog_search::SearchConfig;

pub fn run_config(config: &SearchConfig, example: bool) -> CliResult<i32> {
    if example {
        print!("{}", SearchConfig::example_yaml_config());
        return Ok(EXIT_SUCCESS);
    }

    let yaml = serde_yaml::to_string(config).cli_general_error()?;
    print!("{yaml}");
    if config.embedding_api_key.is_some() {
        println!("# embedding_api_key: set (hidden)");
    }
    Ok(EXIT_SUCCESS)
}
