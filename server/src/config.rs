//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::Context;
use plauder_core::{NamensRegel, PlauderError, SERVER_QUELLE, STANDARD_NAMENSMUSTER};
use plauder_observability::logging::{log_format_gueltig, log_level_gueltig};
use plauder_protocol::wire::MAX_FRAME_SIZE_LIMIT;
use plauder_relay::RelayConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Regeln fuer Anzeigenamen
    pub namen: NamenEinstellungen,
    /// Sitzungs-Einstellungen (Timeouts, Queues)
    pub sitzung: SitzungEinstellungen,
    /// Verhalten beim Herunterfahren
    pub shutdown: ShutdownEinstellungen,
    /// Audit-Log
    pub audit: AuditEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Groesse des Worker-Pools; weitere Verbindungen warten auf einen Slot
    pub max_sitzungen: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Plauder Server".into(),
            max_sitzungen: 64,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse (IPv4 oder IPv6, ohne Port)
    pub bind_adresse: String,
    /// TCP-Port des Chat-Relays
    pub port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 56101,
        }
    }
}

/// Regeln fuer Anzeigenamen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamenEinstellungen {
    /// Regulaerer Ausdruck, muss auf den ganzen Namen passen
    pub muster: String,
    /// Namen die kein Client verwenden darf
    pub reserviert: Vec<String>,
}

impl Default for NamenEinstellungen {
    fn default() -> Self {
        Self {
            muster: STANDARD_NAMENSMUSTER.into(),
            reserviert: vec![SERVER_QUELLE.into()],
        }
    }
}

/// Sitzungs-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SitzungEinstellungen {
    /// Leerlauf in Sekunden nach dem erneut ein LoginRequest gesendet wird
    pub login_aufforderung_sek: u64,
    /// Obergrenze pro Schreibvorgang
    pub schreib_timeout_ms: u64,
    /// Kapazitaet der Send-Queue pro Client
    pub sende_queue_groesse: usize,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_bytes: usize,
}

impl Default for SitzungEinstellungen {
    fn default() -> Self {
        Self {
            login_aufforderung_sek: 30,
            schreib_timeout_ms: 5000,
            sende_queue_groesse: 64,
            max_frame_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownEinstellungen {
    /// Wartezeit auf laufende Sitzungen bevor sie abgebrochen werden
    pub gnadenfrist_ms: u64,
}

impl Default for ShutdownEinstellungen {
    fn default() -> Self {
        Self {
            gnadenfrist_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditEinstellungen {
    /// Anzahl gemerkter Nachrichten (0 = Audit-Log aus)
    pub kapazitaet: usize,
}

impl Default for AuditEinstellungen {
    fn default() -> Self {
        Self { kapazitaet: 1024 }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                config
                    .validieren()
                    .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft Wertebereiche, die serde allein nicht abdeckt
    pub fn validieren(&self) -> Result<(), PlauderError> {
        if self.server.max_sitzungen == 0 {
            return Err(PlauderError::konfiguration("max_sitzungen darf nicht 0 sein"));
        }
        if self.sitzung.sende_queue_groesse == 0 {
            return Err(PlauderError::konfiguration("sende_queue_groesse darf nicht 0 sein"));
        }
        if self.sitzung.login_aufforderung_sek == 0 {
            return Err(PlauderError::konfiguration(
                "login_aufforderung_sek darf nicht 0 sein",
            ));
        }
        if self.sitzung.max_frame_bytes == 0 || self.sitzung.max_frame_bytes > MAX_FRAME_SIZE_LIMIT {
            return Err(PlauderError::konfiguration(format!(
                "max_frame_bytes muss zwischen 1 und {MAX_FRAME_SIZE_LIMIT} liegen, ist {}",
                self.sitzung.max_frame_bytes
            )));
        }
        if !log_level_gueltig(&self.logging.level) {
            return Err(PlauderError::konfiguration(format!(
                "Unbekannter Log-Level '{}'",
                self.logging.level
            )));
        }
        if !log_format_gueltig(&self.logging.format) {
            return Err(PlauderError::konfiguration(format!(
                "Unbekanntes Log-Format '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }

    fn bind_ip(&self) -> anyhow::Result<IpAddr> {
        self.netzwerk
            .bind_adresse
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{}'", self.netzwerk.bind_adresse))
    }

    /// Socket-Adresse des Chat-Relays
    pub fn relay_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        Ok(SocketAddr::new(self.bind_ip()?, self.netzwerk.port))
    }

    /// Socket-Adresse des Observability-Servers
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        Ok(SocketAddr::new(self.bind_ip()?, self.observability.port))
    }

    /// Baut die unveraenderliche Laufzeit-Konfiguration des Relays
    pub fn relay_config(&self) -> anyhow::Result<RelayConfig> {
        self.validieren()?;
        let namens_regel = NamensRegel::neu(&self.namen.muster, self.namen.reserviert.iter())
            .context("Namensregel ungueltig")?;

        Ok(RelayConfig {
            bind_adresse: self.relay_bind_adresse()?,
            max_sitzungen: self.server.max_sitzungen,
            namens_regel,
            login_aufforderung: Duration::from_secs(self.sitzung.login_aufforderung_sek),
            schreib_timeout: Duration::from_millis(self.sitzung.schreib_timeout_ms),
            sende_queue_groesse: self.sitzung.sende_queue_groesse,
            max_frame_bytes: self.sitzung.max_frame_bytes,
            gnadenfrist: Duration::from_millis(self.shutdown.gnadenfrist_ms),
            audit_kapazitaet: self.audit.kapazitaet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_sitzungen, 64);
        assert_eq!(cfg.netzwerk.port, 56101);
        assert_eq!(cfg.namen.reserviert, vec!["server".to_string()]);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.relay_config().is_ok());
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(
            cfg.relay_bind_adresse().unwrap(),
            "0.0.0.0:56101".parse().unwrap()
        );
        assert_eq!(
            cfg.observability_bind_adresse().unwrap(),
            "0.0.0.0:9300".parse().unwrap()
        );
    }

    #[test]
    fn ipv6_bind_adresse() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "::1".into();
        assert_eq!(
            cfg.relay_bind_adresse().unwrap(),
            "[::1]:56101".parse().unwrap()
        );
    }

    #[test]
    fn ungueltige_bind_adresse_ist_fehler() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "localhost:80".into();
        assert!(cfg.relay_config().is_err());
    }

    #[test]
    fn null_sitzungen_ist_fehler() {
        let mut cfg = ServerConfig::default();
        cfg.server.max_sitzungen = 0;
        let fehler = cfg.relay_config().unwrap_err();
        assert!(fehler.to_string().contains("max_sitzungen"));
    }

    #[test]
    fn null_login_aufforderung_ist_fehler() {
        let mut cfg = ServerConfig::default();
        cfg.sitzung.login_aufforderung_sek = 0;
        let fehler = cfg.relay_config().unwrap_err();
        assert!(fehler.to_string().contains("login_aufforderung_sek"));
    }

    #[test]
    fn frame_groesse_muss_ins_laengenfeld_passen() {
        let mut cfg = ServerConfig::default();
        cfg.sitzung.max_frame_bytes = 0;
        assert!(cfg.validieren().is_err());

        cfg.sitzung.max_frame_bytes = MAX_FRAME_SIZE_LIMIT;
        assert!(cfg.validieren().is_ok());

        cfg.sitzung.max_frame_bytes = (u32::MAX as u64 + 1) as usize;
        let fehler = cfg.relay_config().unwrap_err();
        assert!(fehler.to_string().contains("max_frame_bytes"));
    }

    #[test]
    fn logging_werte_werden_geprueft() {
        let mut cfg = ServerConfig::default();
        cfg.logging.level = "verbose".into();
        assert!(matches!(cfg.validieren(), Err(PlauderError::Konfiguration(_))));

        cfg.logging.level = "debug".into();
        cfg.logging.format = "xml".into();
        let fehler = cfg.validieren().unwrap_err();
        assert!(fehler.to_string().contains("xml"));

        cfg.logging.format = "json".into();
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn laden_lehnt_ungueltige_datei_ab() {
        let pfad = std::env::temp_dir().join(format!(
            "plauder-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&pfad, "[logging]\nformat = \"xml\"\n").unwrap();

        let ergebnis = ServerConfig::laden(pfad.to_str().unwrap());
        std::fs::remove_file(&pfad).unwrap();

        let fehler = ergebnis.unwrap_err();
        assert!(format!("{fehler:#}").contains("Log-Format"));
    }

    #[test]
    fn ungueltiges_namensmuster_ist_fehler() {
        let mut cfg = ServerConfig::default();
        cfg.namen.muster = "(".into();
        assert!(cfg.relay_config().is_err());
    }

    #[test]
    fn relay_config_uebernimmt_werte() {
        let toml = r#"
            [server]
            max_sitzungen = 2

            [namen]
            muster = "[a-z]+"
            reserviert = ["server", "admin"]

            [sitzung]
            schreib_timeout_ms = 250

            [shutdown]
            gnadenfrist_ms = 50
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        let relay = cfg.relay_config().unwrap();

        assert_eq!(relay.max_sitzungen, 2);
        assert_eq!(relay.schreib_timeout, Duration::from_millis(250));
        assert_eq!(relay.gnadenfrist, Duration::from_millis(50));
        assert_eq!(relay.login_aufforderung, Duration::from_secs(30));
        assert!(relay.namens_regel.ist_gueltig("alice"));
        assert!(!relay.namens_regel.ist_gueltig("Alice1"));
        assert!(!relay.namens_regel.ist_gueltig("admin"));
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Mein Server"

            [netzwerk]
            port = 10000
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Mein Server");
        assert_eq!(cfg.netzwerk.port, 10000);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.audit.kapazitaet, 1024);
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/gibt/es/nicht/plauder.toml").unwrap();
        assert_eq!(cfg.netzwerk.port, 56101);
    }
}
