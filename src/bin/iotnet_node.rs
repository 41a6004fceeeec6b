// SPDX-License-Identifier: Apache-2.0

use std::{net::Ipv4Addr, str::FromStr};

use iotnet::{MacAddr, NetError, NodeConfig, RawEthLink, Stack};

const APP_NAME: &str = "iotnet-node";

const ARG_IFNAME: &str = "ifname";
const ARG_MAC: &str = "mac";
const ARG_BROKER: &str = "broker";
const ARG_STATIC: &str = "static";
const ARG_NETMASK: &str = "netmask";
const ARG_GATEWAY: &str = "gateway";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::new()
        .filter(Some("iotnet"), log::LevelFilter::Info)
        .filter(Some("iotnet_node"), log::LevelFilter::Debug)
        .parse_default_env()
        .init();

    let matches = clap::Command::new(APP_NAME)
        .version(clap::crate_version!())
        .about("IoT node with DHCP, TCP and MQTT on a raw Ethernet socket")
        .arg(
            clap::Arg::new(ARG_IFNAME)
                .index(1)
                .required(true)
                .help("Interface name"),
        )
        .arg(
            clap::Arg::new(ARG_MAC)
                .long(ARG_MAC)
                .short('m')
                .help("MAC address of the node, default to the interface one"),
        )
        .arg(
            clap::Arg::new(ARG_BROKER)
                .long(ARG_BROKER)
                .short('b')
                .help("MQTT broker IPv4 address"),
        )
        .arg(
            clap::Arg::new(ARG_STATIC)
                .long(ARG_STATIC)
                .short('s')
                .help("Static IPv4 address, disables DHCP"),
        )
        .arg(
            clap::Arg::new(ARG_NETMASK)
                .long(ARG_NETMASK)
                .default_value("255.255.255.0")
                .help("Subnet mask of the static address"),
        )
        .arg(
            clap::Arg::new(ARG_GATEWAY)
                .long(ARG_GATEWAY)
                .short('g')
                .default_value("0.0.0.0")
                .help("Gateway and DNS server of the static address"),
        )
        .get_matches();

    if let Err(e) = run(&matches).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn get_ipv4(
    matches: &clap::ArgMatches,
    name: &str,
) -> Result<Option<Ipv4Addr>, NetError> {
    match matches.get_one::<String>(name) {
        Some(s) => Ok(Some(Ipv4Addr::from_str(s)?)),
        None => Ok(None),
    }
}

async fn open_link(
    iface_name: &str,
    mac: Option<MacAddr>,
) -> Result<RawEthLink, NetError> {
    match mac {
        Some(mac) => RawEthLink::new(iface_name, mac, true),
        #[cfg(feature = "netlink")]
        None => RawEthLink::open(iface_name).await,
        #[cfg(not(feature = "netlink"))]
        None => Err(NetError::new(
            iotnet::ErrorKind::InvalidArgument,
            format!(
                "Please specify the MAC address for {iface_name} with \
                 --{ARG_MAC}"
            ),
        )),
    }
}

async fn run(matches: &clap::ArgMatches) -> Result<(), NetError> {
    let iface_name = matches
        .get_one::<String>(ARG_IFNAME)
        .map(String::as_str)
        .unwrap_or_default();
    let mac = matches
        .get_one::<String>(ARG_MAC)
        .map(|s| MacAddr::from_str(s))
        .transpose()?;

    let link = open_link(iface_name, mac).await?;

    let mut config = NodeConfig::new();
    config.set_mac(link.mac());
    if let Some(broker) = get_ipv4(matches, ARG_BROKER)? {
        config.set_broker_ip(broker);
    }
    if let Some(ip) = get_ipv4(matches, ARG_STATIC)? {
        let netmask =
            get_ipv4(matches, ARG_NETMASK)?.unwrap_or(Ipv4Addr::UNSPECIFIED);
        let gateway =
            get_ipv4(matches, ARG_GATEWAY)?.unwrap_or(Ipv4Addr::UNSPECIFIED);
        config
            .set_dhcp_enabled(false)
            .set_static_ip(ip, netmask, gateway, gateway);
    }
    log::debug!("Node config {config:?}");

    let mut stack = Stack::new(&config, link);
    iotnet::run(&mut stack).await
}
