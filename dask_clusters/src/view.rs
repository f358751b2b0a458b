//! Listing views: pure projections of the cluster list.
//!
//! Nothing in here holds state or talks to the network. The manager builds a
//! [`Listing`] from its current state and hands it to a [`Render`]
//! implementation; user input on an item is turned back into [`Intent`]s by
//! [`ListingItem::click`], which the front end then carries out against the
//! manager.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::model::{AdaptBounds, ClusterId, ClusterModel};

/// Something that can show a listing to the user.
pub trait Render: Send + Sync {
    /// Draw `listing`, replacing whatever was drawn before.
    fn render(&self, listing: &Listing);

    /// Forget what was drawn before, so the next `render` draws in full.
    /// Called when the panel becomes visible again.
    fn invalidate(&self) {}
}

/// The whole cluster list, as shown in the panel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Listing {
    /// One item per cluster, in server order.
    pub items: Vec<ListingItem>,

    /// When the cluster list was last fetched, if ever.
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Listing {
    /// Look up the item for `id`.
    pub fn item(&self, id: &ClusterId) -> Option<&ListingItem> {
        self.items.iter().find(|item| &item.model.id == id)
    }

    /// The item currently marked active.
    pub fn active_item(&self) -> Option<&ListingItem> {
        self.items.iter().find(|item| item.active)
    }
}

/// Build the listing for `clusters`, marking the one with `active_id`.
pub fn listing_view(
    clusters: &[ClusterModel],
    active_id: Option<&ClusterId>,
    refreshed_at: Option<DateTime<Utc>>,
) -> Listing {
    let items = clusters
        .iter()
        .map(|cluster| listing_item_view(cluster, Some(&cluster.id) == active_id))
        .collect();
    Listing {
        items,
        refreshed_at,
    }
}

/// Build the view of a single cluster.
pub fn listing_item_view(cluster: &ClusterModel, active: bool) -> ListingItem {
    ListingItem {
        model: cluster.to_owned(),
        active,
    }
}

/// A single cluster's summary and buttons.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListingItem {
    /// The cluster shown by this item.
    pub model: ClusterModel,

    /// Is this the active cluster?
    pub active: bool,
}

/// The buttons on each item, in display order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ItemButton {
    /// Insert connection code for this cluster into the editor.
    InjectClientCode,
    /// Open the scaling dialog.
    Scale,
    /// Shut the cluster down.
    Stop,
}

impl ItemButton {
    /// Every button, in display order.
    pub const ALL: [ItemButton; 3] = [
        ItemButton::InjectClientCode,
        ItemButton::Scale,
        ItemButton::Stop,
    ];

    /// The button's label.
    pub fn label(self) -> &'static str {
        match self {
            ItemButton::InjectClientCode => "CODE",
            ItemButton::Scale => "SCALE",
            ItemButton::Stop => "SHUTDOWN",
        }
    }
}

/// Where on an item the user clicked.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClickTarget {
    /// Anywhere on the item that isn't a button.
    Body,
    /// One of the item's buttons.
    Button(ItemButton),
}

/// Whether an event keeps bubbling to enclosing handlers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Propagation {
    /// Let the enclosing element see the event too.
    Continue,
    /// The event was fully handled here.
    Stop,
}

/// An action requested by the user through the listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Intent {
    /// Make this cluster the active one.
    Select(ClusterId),
    /// Insert connection code for this cluster.
    InjectClientCode(ClusterModel),
    /// Rescale this cluster.
    Scale(ClusterId),
    /// Stop this cluster.
    Stop(ClusterId),
}

impl ListingItem {
    /// Handle a click at `target`, bubbling from the button (if any) up to
    /// the item body.
    ///
    /// Every button stops propagation, so clicking a button never also
    /// selects the cluster.
    pub fn click(&self, target: ClickTarget) -> Vec<Intent> {
        let mut intents = vec![];
        if let ClickTarget::Button(button) = target {
            let (intent, propagation) = self.on_button(button);
            intents.push(intent);
            if propagation == Propagation::Stop {
                return intents;
            }
        }
        intents.push(Intent::Select(self.model.id.clone()));
        intents
    }

    fn on_button(&self, button: ItemButton) -> (Intent, Propagation) {
        let intent = match button {
            ItemButton::InjectClientCode => Intent::InjectClientCode(self.model.clone()),
            ItemButton::Scale => Intent::Scale(self.model.id.clone()),
            ItemButton::Stop => Intent::Stop(self.model.id.clone()),
        };
        (intent, Propagation::Stop)
    }
}

impl fmt::Display for ListingItem {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = &self.model;
        let marker = if self.active { "*" } else { " " };
        writeln!(fmt, "{} {} ({})", marker, model.name, model.id)?;
        writeln!(fmt, "    Scheduler Address  {}", model.scheduler_address)?;
        writeln!(fmt, "    Dashboard URL      {}", model.dashboard_link)?;
        writeln!(fmt, "    Number of Cores    {}", model.cores)?;
        writeln!(fmt, "    Memory             {}", model.memory)?;
        writeln!(fmt, "    Workers            {}", model.workers)?;
        if let Some(AdaptBounds { minimum, maximum }) = model.adapt {
            writeln!(fmt, "    Minimum Workers    {}", minimum)?;
            writeln!(fmt, "    Maximum Workers    {}", maximum)?;
        }
        let buttons = ItemButton::ALL
            .iter()
            .map(|b| format!("[{}]", b.label()))
            .collect::<Vec<_>>();
        writeln!(fmt, "    {}", buttons.join(" "))
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.refreshed_at {
            Some(at) => writeln!(fmt, "CLUSTERS (updated {})", at.format("%H:%M:%S"))?,
            None => writeln!(fmt, "CLUSTERS")?,
        }
        if self.items.is_empty() {
            return writeln!(fmt, "  No clusters running");
        }
        for item in &self.items {
            write!(fmt, "{}", item)?;
        }
        Ok(())
    }
}

#[cfg(test)]
use crate::testing::cluster;

#[test]
fn marks_only_the_active_cluster() {
    let clusters = vec![cluster("a"), cluster("b"), cluster("c")];
    let listing = listing_view(&clusters, Some(&ClusterId::from("b")), None);
    let active = listing
        .items
        .iter()
        .map(|item| item.active)
        .collect::<Vec<_>>();
    assert_eq!(active, vec![false, true, false]);
    assert_eq!(listing.active_item().unwrap().model.id.as_str(), "b");

    let none = listing_view(&clusters, None, None);
    assert!(none.active_item().is_none());
}

#[test]
fn buttons_do_not_select() {
    let item = listing_item_view(&cluster("a"), false);
    for &button in &ItemButton::ALL {
        let intents = item.click(ClickTarget::Button(button));
        assert_eq!(intents.len(), 1);
        assert!(!matches!(intents[0], Intent::Select(_)));
    }
    assert_eq!(
        item.click(ClickTarget::Button(ItemButton::Stop)),
        vec![Intent::Stop(ClusterId::from("a"))],
    );
    assert_eq!(
        item.click(ClickTarget::Body),
        vec![Intent::Select(ClusterId::from("a"))],
    );
}

#[test]
fn adaptive_bounds_only_shown_when_adaptive() {
    let mut model = cluster("a");
    let manual = listing_item_view(&model, true).to_string();
    assert!(manual.starts_with("* Cluster a (a)\n"));
    assert!(!manual.contains("Minimum Workers"));

    model.adapt = Some(AdaptBounds {
        minimum: 1,
        maximum: 9,
    });
    let adaptive = listing_item_view(&model, false).to_string();
    assert!(adaptive.contains("    Minimum Workers    1\n"));
    assert!(adaptive.contains("    Maximum Workers    9\n"));
    assert!(adaptive.contains("[CODE] [SCALE] [SHUTDOWN]"));
}

#[test]
fn empty_listing_says_so() {
    let listing = listing_view(&[], None, None);
    assert_eq!(listing.to_string(), "CLUSTERS\n  No clusters running\n");
}
