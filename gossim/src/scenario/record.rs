//! The `#`-records of the textual scenario format.
//!
//! A scenario is a list of positional records, one per line, every field
//! surrounded by `#`:
//!
//! ```text
//! #Timing#step(ns)#duration(ns)#
//! #Sender#id#name#showName#ip#target#rate(Mbps)#gos#backup#mpls#payload#
//! #Receiver#id#name#showName#ip#
//! #LER#id#name#showName#ip#switching(Mbps)#buffer(MiB)#ports#
//! #ActiveLER#id#name#showName#ip#switching(Mbps)#buffer(MiB)#ports#dmgp(KiB)#
//! #ExternalLink#id#name#showName#delay(ns)#headIP#headPort#tailIP#tailPort#
//! ```
//!
//! `LSR`/`ActiveLSR` take the same fields as the LERs and `InternalLink`
//! the same fields as `ExternalLink`. The payload of a sender is a number
//! of bytes or `variable`. Blank lines and lines starting with `@`
//! (layout information of the editor) are skipped.

use anyhow::{Context as _, Result, bail, ensure};
use gossim_core::{
    Address, BitRate, LinkDelay,
    link::{LinkConfig, LinkEndpoint, LinkKind},
    node::{NodeConfig, NodeRole, PayloadMode, PortId, RouterConfig, SenderConfig},
    pdu::GosLevel,
    time::nanos,
};
use std::{fmt, str::FromStr, time::Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Timing { step: Duration, duration: Duration },
    Node { id: u64, config: NodeConfig },
    Link { id: u64, config: LinkConfig },
}

/// The records of `text`, in order.
pub fn parse_records(text: &str) -> Result<Vec<Record>> {
    text.lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('@'))
        .map(|(number, line)| {
            line.parse()
                .with_context(|| format!("Invalid record on line {number}"))
        })
        .collect()
}

struct Fields<'a> {
    fields: std::str::Split<'a, char>,
}

impl<'a> Fields<'a> {
    fn new(line: &'a str) -> Result<(&'a str, Self)> {
        let inner = line
            .strip_prefix('#')
            .and_then(|line| line.strip_suffix('#'))
            .context("A record starts and ends with '#'")?;
        let mut fields = inner.split('#');
        let kind = fields.next().unwrap_or_default();
        Ok((kind, Self { fields }))
    }

    fn next(&mut self, what: &'static str) -> Result<&'a str> {
        self.fields
            .next()
            .with_context(|| format!("Missing field {what}"))
    }

    fn parse<T>(&mut self, what: &'static str) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let field = self.next(what)?;
        field
            .trim()
            .parse()
            .map_err(|error| anyhow::anyhow!("Invalid {what} {field:?}: {error}"))
    }

    fn flag(&mut self, what: &'static str) -> Result<bool> {
        match self.next(what)?.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => bail!("Invalid {what} {other:?}: expected true or false"),
        }
    }

    fn nanos(&mut self, what: &'static str) -> Result<Duration> {
        self.parse(what).map(Duration::from_nanos)
    }

    fn finish(mut self) -> Result<()> {
        match self.fields.next() {
            None => Ok(()),
            Some(extra) => bail!("Unexpected field {extra:?}"),
        }
    }
}

fn parse_router(fields: &mut Fields<'_>, active: bool) -> Result<(RouterConfig, usize)> {
    let config = RouterConfig::default()
        .set_switching_rate(BitRate::from_mbps(fields.parse("switching power")?))
        .set_buffer_mib(fields.parse("buffer size")?);
    let ports = fields.parse("number of ports")?;
    let config = if active {
        config.set_active(fields.parse("DMGP size")?)
    } else {
        config
    };
    Ok((config, ports))
}

fn parse_node(kind: &str, fields: &mut Fields<'_>) -> Result<(u64, NodeConfig)> {
    let id = fields.parse("id")?;
    let name = fields.next("name")?.to_owned();
    let show_name = fields.flag("showName")?;
    let address: Address = fields.parse("ip")?;

    let mut ports = None;
    let role = match kind {
        "Sender" => {
            let target = fields.parse("target")?;
            let rate = BitRate::from_mbps(fields.parse("rate")?);
            let level: u8 = fields.parse("gos")?;
            let gos = GosLevel::new(level).with_context(|| format!("Invalid gos {level}"))?;
            let backup = fields.flag("backup")?;
            let mpls = fields.flag("mpls")?;
            let payload = match fields.next("payload")?.trim() {
                "variable" => PayloadMode::Variable,
                bytes => PayloadMode::Constant(
                    bytes
                        .parse()
                        .with_context(|| format!("Invalid payload {bytes:?}"))?,
                ),
            };
            NodeRole::Sender(
                SenderConfig::new(target)
                    .set_rate(rate)
                    .set_gos(gos)
                    .set_backup(backup)
                    .set_mpls(mpls)
                    .set_payload(payload),
            )
        }
        "Receiver" => NodeRole::Receiver,
        "LER" | "ActiveLER" => {
            let (config, count) = parse_router(fields, kind == "ActiveLER")?;
            ports = Some(count);
            NodeRole::Ler(config)
        }
        "LSR" | "ActiveLSR" => {
            let (config, count) = parse_router(fields, kind == "ActiveLSR")?;
            ports = Some(count);
            NodeRole::Lsr(config)
        }
        other => bail!("Unknown record {other:?}"),
    };

    let mut config = NodeConfig::new(name, address, role).set_show_name(show_name);
    if let Some(ports) = ports {
        config = config.set_ports(ports);
    }
    Ok((id, config))
}

fn parse_link(kind: LinkKind, fields: &mut Fields<'_>) -> Result<(u64, LinkConfig)> {
    let id = fields.parse("id")?;
    let name = fields.next("name")?.to_owned();
    let show_name = fields.flag("showName")?;
    let delay = LinkDelay::new(fields.nanos("delay")?);
    let head = LinkEndpoint::new(fields.parse("headIP")?, fields.parse::<PortId>("headPort")?);
    let tail = LinkEndpoint::new(fields.parse("tailIP")?, fields.parse::<PortId>("tailPort")?);

    let config = LinkConfig::new(name, kind, head, tail)
        .set_delay(delay)
        .set_show_name(show_name);
    Ok((id, config))
}

impl FromStr for Record {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (kind, mut fields) = Fields::new(line.trim())?;

        let record = match kind {
            "Timing" => {
                let step = fields.nanos("step")?;
                let duration = fields.nanos("duration")?;
                ensure!(!step.is_zero(), "The step cannot be zero");
                Self::Timing { step, duration }
            }
            "ExternalLink" => {
                let (id, config) = parse_link(LinkKind::External, &mut fields)?;
                Self::Link { id, config }
            }
            "InternalLink" => {
                let (id, config) = parse_link(LinkKind::Internal, &mut fields)?;
                Self::Link { id, config }
            }
            kind => {
                let (id, config) = parse_node(kind, &mut fields)?;
                Self::Node { id, config }
            }
        };

        fields.finish()?;
        Ok(record)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timing { step, duration } => {
                write!(f, "#Timing#{}#{}#", nanos(*step), nanos(*duration))
            }
            Self::Node { id, config } => {
                write!(
                    f,
                    "#{}#{id}#{}#{}#{}#",
                    config.role.name(),
                    config.name,
                    config.show_name,
                    config.address
                )?;
                match &config.role {
                    NodeRole::Sender(sender) => {
                        let payload = match sender.payload {
                            PayloadMode::Constant(bytes) => bytes.to_string(),
                            PayloadMode::Variable => "variable".to_owned(),
                        };
                        write!(
                            f,
                            "{}#{}#{}#{}#{}#{payload}#",
                            sender.target,
                            sender.rate.mbps(),
                            sender.gos,
                            sender.backup,
                            sender.mpls
                        )
                    }
                    NodeRole::Receiver => Ok(()),
                    NodeRole::Ler(router) | NodeRole::Lsr(router) => {
                        write!(
                            f,
                            "{}#{}#{}#",
                            router.switching_rate.mbps(),
                            router.buffer_mib,
                            config.ports
                        )?;
                        if router.active {
                            write!(f, "{}#", router.dmgp_kib)?;
                        }
                        Ok(())
                    }
                }
            }
            Self::Link { id, config } => write!(
                f,
                "#{}#{id}#{}#{}#{}#{}#{}#{}#{}#",
                config.kind,
                config.name,
                config.show_name,
                config.delay.as_nanos(),
                config.head.address,
                config.head.port,
                config.tail.address,
                config.tail.port
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_link() {
        let record: Record = "#ExternalLink#7#l1#true#1000#10.0.0.1#0#10.0.0.2#3#"
            .parse()
            .unwrap();
        let Record::Link { id, config } = &record else {
            panic!("not a link: {record:?}");
        };
        assert_eq!(*id, 7);
        assert_eq!(config.kind, LinkKind::External);
        assert_eq!(config.delay.as_nanos(), 1_000);
        assert_eq!(config.tail.port, PortId::new(3));
        assert_eq!(
            record.to_string(),
            "#ExternalLink#7#l1#true#1000#10.0.0.1#0#10.0.0.2#3#"
        );
    }

    #[test]
    fn sender() {
        let line = "#Sender#1#s#false#10.0.0.1#10.0.0.9#100#2#true#false#variable#";
        let record: Record = line.parse().unwrap();
        let Record::Node { config, .. } = &record else {
            panic!("not a node: {record:?}");
        };
        let NodeRole::Sender(sender) = &config.role else {
            panic!("not a sender: {config:?}");
        };
        assert_eq!(sender.rate, BitRate::from_mbps(100));
        assert_eq!(sender.gos, GosLevel::new(2).unwrap());
        assert!(sender.backup);
        assert!(!sender.mpls);
        assert_eq!(sender.payload, PayloadMode::Variable);
        assert_eq!(record.to_string(), line);
    }

    #[test]
    fn active_router() {
        let line = "#ActiveLSR#4#core#true#10.0.0.4#2048#4#6#128#";
        let record: Record = line.parse().unwrap();
        let Record::Node { config, .. } = &record else {
            panic!("not a node: {record:?}");
        };
        assert_eq!(config.ports, 6);
        assert!(config.role.is_active());
        assert_eq!(record.to_string(), line);

        let passive: Record = "#LER#5#edge#true#10.0.0.5#1024#1#8#".parse().unwrap();
        assert_eq!(passive.to_string(), "#LER#5#edge#true#10.0.0.5#1024#1#8#");
    }

    #[test]
    fn malformed_records() {
        for line in [
            "Receiver#1#r#true#10.0.0.1#",
            "#Receiver#1#r#true#10.0.0.1",
            "#Receiver#1#r#yes#10.0.0.1#",
            "#Receiver#1#r#true#10.0.0.1#extra#",
            "#Receiver#x#r#true#10.0.0.1#",
            "#Sender#1#s#true#10.0.0.1#10.0.0.2#10#4#false#false#10#",
            "#Router#1#r#true#10.0.0.1#",
            "#Timing#0#1000#",
        ] {
            assert!(line.parse::<Record>().is_err(), "{line}");
        }
    }

    #[test]
    fn skips_blanks_and_layout() {
        let text = "\n#Timing#100#1000#\n@layout#1#20#30\n\n#Receiver#1#r#true#10.0.0.1#\n";
        let records = parse_records(text).unwrap();
        assert_eq!(records.len(), 2);

        let error = parse_records("#Timing#100#1000#\n#Bogus#").unwrap_err();
        assert_eq!(error.to_string(), "Invalid record on line 2");
    }
}
