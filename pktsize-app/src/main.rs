//! Packet size filter: matches IPv4 packets whose IP payload size lies within a configured range.
//! This part is the user space program that validates the configured size filters, loads the eBPF classifier
//! and communicates the range records to it.

use anyhow::Context;
use aya::{
    maps::{perf::AsyncPerfEventArray, HashMap},
    programs::{tc, SchedClassifier, TcAttachType},
    util::online_cpus,
    Ebpf,
};
use aya_log::EbpfLogger;
use bytes::BytesMut;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tokio::{signal, task};

use pktsize_common::{PacketLog, PktSizeRule, Target, MATCH_NAME};

use conf::Direction;
use rules::CompiledRule;

// own modules
pub mod conf;
pub mod network;
pub mod rules;
pub mod sizespec;

const RULE_MAP: &str = "PKTSIZE_RULES";
const EVENT_MAP: &str = "EVENTS";

const USAGE_EXAMPLES: &str = "Match option of a filter:
  --size size[:size]        Match packet size against value or range

Examples:
  matches: [\"--size\", \"65\"]        payload of exactly 65 bytes
  matches: [\"--size\", \"80:120\"]    payload between 80 and 120 bytes
  matches: [\"--size\", \":120\"]      payload up to 120 bytes
  matches: [\"--size\", \"80:\"]       payload of at least 80 bytes";

// command line options
#[derive(Debug, Parser)]
#[clap(version, about = "pktsize: IP payload size range filter", after_help = USAGE_EXAMPLES)]
struct Opt {
    #[clap(short, long, default_value = "./conf/pktsize-filter.yml")]
    config_path: String, // path to config file
    #[clap(
        short,
        long,
        default_value = "./pktsize-ebpf/target/bpfel-unknown-none/release/pktsize"
    )]
    ebpf_object: String, // compiled classifier, see `cargo xtask build-ebpf`
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the classifier, install the filters and log matches until Ctrl-C (default)
    Run,
    /// Validate the configuration and display the filters
    Check,
    /// Print the filters in a form that can be used as match options again
    Save,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let opt = Opt::parse();
    env_logger::init();

    let config = conf::load_config(&opt.config_path).map_err(|err| anyhow::anyhow!("{}", err))?;
    let rules = rules::compile(&config)?;

    match opt.command {
        Some(Command::Check) => {
            for rule in &rules {
                println!("{}", rule.describe());
            }
            println!("Configuration OK: {} size filter(s)", rules.len());
            Ok(())
        }
        Some(Command::Save) => {
            for rule in &rules {
                println!("{}", rule.save());
            }
            Ok(())
        }
        Some(Command::Run) | None => run(&opt.ebpf_object, &rules).await,
    }
}

/// Loads the classifier, installs the range records, attaches to all configured interfaces and logs matches
///
/// # Arguments
/// * `ebpf_object` - path to the compiled eBPF object
/// * `rules` - validated size filters
///
async fn run(ebpf_object: &str, rules: &[CompiledRule]) -> Result<(), anyhow::Error> {
    let mut bpf = Ebpf::load_file(ebpf_object)
        .with_context(|| format!("Cannot load eBPF object {}", ebpf_object))?;
    if let Err(e) = EbpfLogger::init(&mut bpf) {
        // This can happen if you remove all log statements from your eBPF program.
        warn!("failed to initialize eBPF logger: {}", e);
    }

    // records are installed before attaching, so packets never see a partial rule set
    {
        let mut rule_map: HashMap<_, u32, PktSizeRule> = HashMap::try_from(
            bpf.map_mut(RULE_MAP)
                .ok_or_else(|| anyhow::anyhow!("Map {} not found", RULE_MAP))?,
        )?;
        for rule in rules {
            let mut ifindex = Vec::new();
            for iface in &rule.iface {
                let index =
                    network::interface_index(iface).map_err(|err| anyhow::anyhow!("{}", err))?;
                ifindex.push(index);
            }
            info!("Adding rule {} with id {}", rule.describe(), rule.id);
            rule_map.insert(rule.id, rule.to_map_value(&ifindex), 0)?;
        }
    }

    // one program per direction, each only evaluates the rules of its direction
    let points = attach_points(rules);
    for direction in [Direction::Ingress, Direction::Egress] {
        let program_name = rules::to_direction(direction).program_name();
        let ifaces: Vec<&String> = points
            .iter()
            .filter(|(_, point_direction)| *point_direction == direction)
            .map(|(iface, _)| iface)
            .collect();
        if ifaces.is_empty() {
            continue;
        }
        info!("Loading {} classifier {}", MATCH_NAME, program_name);
        let program: &mut SchedClassifier = bpf
            .program_mut(program_name)
            .ok_or_else(|| anyhow::anyhow!("Program {} not found", program_name))?
            .try_into()?;
        program.load()?;
        let attach_type = match direction {
            Direction::Ingress => TcAttachType::Ingress,
            Direction::Egress => TcAttachType::Egress,
        };
        for iface in ifaces {
            info!("Attaching to interface {} ({:?}) ...", iface, direction);
            // fails if the qdisc already exists
            let _ = tc::qdisc_add_clsact(iface);
            program
                .attach(iface, attach_type)
                .with_context(|| format!("Cannot attach to interface {}", iface))?;
        }
    }

    // Get feedback from eBPF module about matching packets
    let names: Vec<String> = rules.iter().map(|rule| rule.name.clone()).collect();
    let mut perf_array = AsyncPerfEventArray::try_from(
        bpf.take_map(EVENT_MAP)
            .ok_or_else(|| anyhow::anyhow!("Map {} not found", EVENT_MAP))?,
    )?;
    for cpu_id in online_cpus().map_err(|(_, error)| error)? {
        let mut buf = perf_array.open(cpu_id, None)?;
        let names = names.clone();
        task::spawn(async move {
            let mut buffers = (0..10)
                .map(|_| BytesMut::with_capacity(1024))
                .collect::<Vec<_>>();
            loop {
                let events = match buf.read_events(&mut buffers).await {
                    Ok(events) => events,
                    Err(err) => {
                        error!("Cannot read events of cpu {}: {}", cpu_id, err);
                        return;
                    }
                };
                for event_buf in buffers.iter().take(events.read) {
                    let ptr = event_buf.as_ptr() as *const PacketLog;
                    let data = unsafe { ptr.read_unaligned() };
                    info!("{}", describe_event(&data, &names));
                }
            }
        });
    }

    info!("Waiting for Ctrl-C...");
    signal::ctrl_c().await?;
    info!("Exiting...");

    Ok(())
}

/// Distinct (interface, direction) pairs of all rules. The classifier of a direction is attached once per interface.
fn attach_points(rules: &[CompiledRule]) -> Vec<(String, Direction)> {
    let mut points: Vec<(String, Direction)> = Vec::new();
    for rule in rules {
        for iface in &rule.iface {
            let point = (iface.clone(), rule.direction);
            if !points.contains(&point) {
                points.push(point);
            }
        }
    }
    points
}

/// Log line for a match event, e.g. "LOG: RULE small, SIZE 65, ACTION DROP"
fn describe_event(event: &PacketLog, names: &[String]) -> String {
    let rule = match names.get(event.rule_id as usize) {
        Some(name) => name.clone(),
        None => format!("#{}", event.rule_id),
    };
    let action = match Target::from_u32(event.target) {
        Some(target) => rules::target_name(target),
        None => "UNKNOWN",
    };
    format!(
        "LOG: RULE {}, SIZE {}, ACTION {}",
        rule, event.payload_size, action
    )
}
