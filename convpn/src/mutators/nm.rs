//! Neutralizes the host's managed NetworkManager connection profile so it
//! stops fighting our default-route replacement and DHCP renewals don't
//! race us, and suppresses the profile's IPv6 method as a leak path.

use serde::{Deserialize, Serialize};

use convpn_lib::journal::{Action, Journal};

use crate::error::Error;
use crate::journal_handle::JournalHandle;
use crate::net_ops::NetOps;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OriginalState {
    pub never_default: String,
    pub ignore_auto_routes: String,
    pub ipv6_method: String,
}

pub async fn neutralize_connection(
    net: &impl NetOps,
    journal: &mut JournalHandle,
    connection: &str,
) -> Result<(), Error> {
    let original = OriginalState {
        never_default: net.nmcli_get_conn_property(connection, "ipv4.never-default").await?,
        ignore_auto_routes: net.nmcli_get_conn_property(connection, "ipv4.ignore-auto-routes").await?,
        ipv6_method: net.nmcli_get_conn_property(connection, "ipv6.method").await?,
    };

    journal.set(Action::NmConnection, connection).await?;
    journal.set(Action::NmOriginalState, &original).await?;

    net.nmcli_set_conn_property(connection, "ipv4.never-default", "yes").await?;
    net.nmcli_set_conn_property(connection, "ipv4.ignore-auto-routes", "yes").await?;
    net.nmcli_set_conn_property(connection, "ipv6.method", "ignore").await?;
    Ok(())
}

pub async fn restore_connection(net: &impl NetOps, journal: &Journal) -> Result<(), Error> {
    let Some(connection) = journal.get::<String>(Action::NmConnection) else {
        return Ok(());
    };
    let Some(original) = journal.get::<OriginalState>(Action::NmOriginalState) else {
        return Ok(());
    };

    net.nmcli_set_conn_property(&connection, "ipv4.never-default", &original.never_default).await?;
    net.nmcli_set_conn_property(&connection, "ipv4.ignore-auto-routes", &original.ignore_auto_routes).await?;
    net.nmcli_set_conn_property(&connection, "ipv6.method", &original.ipv6_method).await?;
    net.nmcli_up(&connection).await?;
    Ok(())
}
