use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("bhp {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: bhp");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("BHP_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("BHP_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!(
        "features: proxy={}, async={}, cli=true",
        cfg!(feature = "proxy"),
        cfg!(feature = "async")
    );
    println!(
        "wire: command 0x{:08X}, response 0x{:08X}",
        bhp_wire::COMMAND_MAGIC,
        bhp_wire::RESPONSE_MAGIC
    );

    Ok(SUCCESS)
}
