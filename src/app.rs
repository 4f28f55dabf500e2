//! Application shell: wires the simulation, UI and networking together.

use crate::config::SimConfig;
use crate::ecs::{EntityId, PlayerId, TargetPriority, Tower};
use crate::events::{RecentEvents, SimObserver as _};
use crate::game::{Outcome, Simulation, WorldSnapshot};
use crate::net::{
    ClientRequest, LocalSession, ServerMessage, ServerState, Transport, connect,
    run_server_internal,
};
use crate::players::Purse;
use crate::ui::{self, Viewport};

use catalog::{Catalog, TowerKind};
use egui::{Align2, Color32, FontId, Painter, Pos2, Rect, RichText, Sense, Stroke, pos2, vec2};
use iroh::EndpointId;
use iroh::protocol::Router;
use tokio::sync::oneshot;

const FEED_LINES: usize = 12;
/// World units around the route kept visible.
const VIEW_MARGIN: f32 = 8.0;
/// Clicks this close to a tower select it instead of building.
const PICK_RADIUS: f32 = 2.5;

/// Which screen the application is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppScreen {
    MainMenu,
    Connecting,
    Playing,
}

pub struct BulwarkApp {
    screen: AppScreen,
    name_input: String,
    server_input: String,
    status: Option<String>,

    // Networking state
    transport: Option<Box<dyn Transport>>,
    router: Option<Router>,
    pending_router: Option<oneshot::Receiver<Router>>,
    player: Option<PlayerId>,

    catalog: Catalog,
    config: SimConfig,
    snapshot: WorldSnapshot,
    feed: RecentEvents,

    selected_kind: TowerKind,
    selected_tower: Option<EntityId>,
}

impl BulwarkApp {
    /// Called once before the first frame.
    pub fn new(cc: &eframe::CreationContext<'_>, catalog: Catalog, config: SimConfig) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::dark());
        Self {
            screen: AppScreen::MainMenu,
            name_input: String::new(),
            server_input: String::new(),
            status: None,
            transport: None,
            router: None,
            pending_router: None,
            player: None,
            catalog,
            config,
            snapshot: WorldSnapshot::default(),
            feed: RecentEvents::new(FEED_LINES),
            selected_kind: TowerKind::Archer,
            selected_tower: None,
        }
    }

    fn player_name(&self) -> String {
        let name = self.name_input.trim();
        if name.is_empty() {
            "Defender".to_owned()
        } else {
            name.to_owned()
        }
    }

    fn start_solo(&mut self) {
        let sim = Simulation::with_defaults(self.catalog.clone(), self.config.clone());
        self.attach(Box::new(LocalSession::new(sim)));
    }

    fn start_server(&mut self) {
        let sim = Simulation::with_defaults(self.catalog.clone(), self.config.clone());
        let (router_tx, router_rx) = oneshot::channel();

        // Spawn an async task to start the server
        tokio::spawn(async move {
            match run_server_internal(ServerState::new(sim)).await {
                Ok(router) => {
                    if router_tx.send(router).is_err() {
                        log::warn!("Server started after the viewer gave up on it");
                    }
                }
                Err(e) => log::error!("Server error: {e}"),
            }
        });

        self.pending_router = Some(router_rx);
        self.status = Some("Starting server...".to_owned());
        self.screen = AppScreen::Connecting;
    }

    fn start_client(&mut self) {
        match self.server_input.trim().parse::<EndpointId>() {
            Ok(id) => {
                let transport = connect(id, self.player_name());
                self.transport = Some(Box::new(transport));
                self.status = Some(format!("Connecting to {id}..."));
                self.screen = AppScreen::Connecting;
            }
            Err(e) => self.status = Some(format!("Invalid server id: {e}")),
        }
    }

    /// Use `transport` for the rest of the session and join through it.
    fn attach(&mut self, mut transport: Box<dyn Transport>) {
        match transport.send(ClientRequest::Join(self.player_name())) {
            Ok(()) => {
                self.transport = Some(transport);
                self.screen = AppScreen::Connecting;
            }
            Err(e) => self.status = Some(format!("Could not join: {e}")),
        }
    }

    /// Pick up the router of a server we are hosting, then connect to it.
    fn poll_router(&mut self) {
        let Some(rx) = &mut self.pending_router else {
            return;
        };
        match rx.try_recv() {
            Ok(router) => {
                self.pending_router = None;
                let transport = connect(router.endpoint().addr(), self.player_name());
                self.transport = Some(Box::new(transport));
                self.router = Some(router);
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => {
                self.pending_router = None;
                self.status = Some("The server failed to start".to_owned());
                self.screen = AppScreen::MainMenu;
            }
        }
    }

    /// Drain all pending network messages into the local copy of the world.
    fn poll_network(&mut self) {
        let Some(transport) = &mut self.transport else {
            return;
        };
        while let Some(message) = transport.try_recv() {
            match message {
                ServerMessage::Welcome { player, catalog } => {
                    self.player = Some(player);
                    self.catalog = catalog;
                    self.status = None;
                    self.screen = AppScreen::Playing;
                }
                ServerMessage::Frame { snapshot, events } => {
                    for event in &events {
                        self.feed.on_event(event);
                    }
                    self.snapshot = snapshot;
                }
            }
        }
    }

    fn request(&mut self, request: ClientRequest) {
        let Some(transport) = &mut self.transport else {
            return;
        };
        if let Err(e) = transport.send(request) {
            log::warn!("Failed to send request: {e}");
            self.status = Some(e.to_string());
        }
    }

    fn purse(&self) -> Option<&Purse> {
        self.snapshot
            .players
            .iter()
            .find(|(id, _)| Some(*id) == self.player)
            .map(|(_, purse)| purse)
    }

    fn selected(&self) -> Option<&Tower> {
        let id = self.selected_tower?;
        self.snapshot.towers.iter().find(|tower| tower.id == id)
    }

    /// Cost of the next upgrade tier of `tower`, if there is one.
    fn upgrade_cost(&self, tower: &Tower) -> Option<u32> {
        let tier = tower.level.saturating_sub(1) as usize;
        self.catalog
            .tower(tower.kind)
            .and_then(|stats| stats.upgrades.get(tier))
            .map(|upgrade| upgrade.cost)
    }
}

impl eframe::App for BulwarkApp {
    /// Called each time the UI needs repainting, which may be many times per second.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_router();
        self.poll_network();

        // Request continuous repainting so frames keep flowing in
        ctx.request_repaint();

        match self.screen {
            AppScreen::MainMenu => self.show_main_menu(ctx),
            AppScreen::Connecting => self.show_connecting(ctx),
            AppScreen::Playing => {
                self.input(ctx);
                self.show_hud(ctx);
                self.show_side_panel(ctx);
                self.show_field(ctx);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Menu screens
// ---------------------------------------------------------------------------

impl BulwarkApp {
    fn show_main_menu(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(50.0);
                ui.heading(RichText::new("Bulwark").size(32.0));
                ui.add_space(30.0);

                ui.label("Your name:");
                ui.text_edit_singleline(&mut self.name_input);
                ui.add_space(20.0);

                if ui.button(RichText::new("Play Solo").size(20.0)).clicked() {
                    self.start_solo();
                }
                ui.add_space(10.0);
                if ui.button(RichText::new("Host Game").size(20.0)).clicked() {
                    self.start_server();
                }
                ui.add_space(20.0);

                ui.label("Enter Server ID:");
                ui.text_edit_singleline(&mut self.server_input);
                if ui.button(RichText::new("Join Online Game").size(20.0)).clicked() {
                    self.start_client();
                }

                if let Some(status) = &self.status {
                    ui.add_space(20.0);
                    ui.colored_label(Color32::LIGHT_RED, status);
                }
            });
        });
    }

    fn show_connecting(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(80.0);
                ui.spinner();
                ui.label(self.status.as_deref().unwrap_or("Joining..."));
                ui.add_space(20.0);
                if ui.button("Back").clicked() {
                    self.transport = None;
                    self.pending_router = None;
                    self.router = None;
                    self.status = None;
                    self.screen = AppScreen::MainMenu;
                }
            });
        });
    }

    // -----------------------------------------------------------------------
    // Input
    // -----------------------------------------------------------------------

    fn input(&mut self, ctx: &egui::Context) {
        let mut start_wave = false;
        ctx.input(|i| {
            start_wave = i.key_pressed(egui::Key::Space);
            for (key, kind) in [egui::Key::Num1, egui::Key::Num2, egui::Key::Num3]
                .into_iter()
                .zip(TowerKind::ALL)
            {
                if i.key_pressed(key) {
                    self.selected_kind = kind;
                }
            }
        });
        if start_wave {
            self.request(ClientRequest::StartWave);
        }
    }

    // -----------------------------------------------------------------------
    // Panels
    // -----------------------------------------------------------------------

    fn show_hud(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("hud").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if let Some(purse) = self.purse() {
                    ui.label(format!(
                        "{}   Gold {}   Lives {}   Score {}",
                        purse.name, purse.gold, purse.lives, purse.score
                    ));
                }
                let waves = self.snapshot.waves;
                ui.separator();
                ui.label(if waves.active {
                    format!("Wave {}/{} in progress", waves.current, waves.total)
                } else {
                    format!("Wave {}/{}", waves.current, waves.total)
                });
                ui.separator();

                for (index, kind) in TowerKind::ALL.into_iter().enumerate() {
                    let cost = self.catalog.tower(kind).map_or(0, |stats| stats.cost);
                    ui.selectable_value(
                        &mut self.selected_kind,
                        kind,
                        format!("[{}] {kind} ({cost})", index + 1),
                    );
                }
                ui.separator();

                let can_start = !waves.active && self.snapshot.outcome.is_none();
                if ui
                    .add_enabled(can_start, egui::Button::new("Start Wave"))
                    .clicked()
                {
                    self.request(ClientRequest::StartWave);
                }

                match self.snapshot.outcome {
                    Some(Outcome::Victory) => {
                        ui.colored_label(Color32::GOLD, "Victory!");
                    }
                    Some(Outcome::Defeat) => {
                        ui.colored_label(Color32::RED, "Defeat");
                    }
                    None => {}
                }
            });

            if let Some(router) = &self.router {
                ui.horizontal(|ui| {
                    let id = router.endpoint().id().to_string();
                    ui.label(format!("Hosting as {id}"));
                    if ui.small_button("Copy").clicked() {
                        ui.ctx().copy_text(id);
                    }
                });
            }
        });
    }

    fn show_side_panel(&mut self, ctx: &egui::Context) {
        let mut upgrade = None;
        let mut retarget = None;
        egui::SidePanel::right("side").show(ctx, |ui| {
            ui.heading("Tower");
            match self.selected() {
                Some(tower) => {
                    ui.label(format!("{} level {}", tower.kind, tower.level));
                    ui.label(format!("Damage {:.0}", tower.damage));
                    ui.label(format!("Range {:.1}", tower.range));
                    ui.label(format!("Attacks/s {:.2}", tower.attack_speed));
                    match self.upgrade_cost(tower) {
                        Some(cost) => {
                            if ui.button(format!("Upgrade ({cost} gold)")).clicked() {
                                upgrade = Some(tower.id);
                            }
                        }
                        None => {
                            ui.label("Max level");
                        }
                    }

                    let mut priority = tower.priority;
                    egui::ComboBox::from_label("Target")
                        .selected_text(priority.to_string())
                        .show_ui(ui, |ui| {
                            for option in TargetPriority::ALL {
                                ui.selectable_value(&mut priority, option, option.to_string());
                            }
                        });
                    if priority != tower.priority {
                        retarget = Some((tower.id, priority));
                    }
                }
                None => {
                    ui.label("Click a tower to select it.");
                }
            }

            ui.separator();
            ui.heading("Log");
            ui.label(format!(
                "Kills {}   Leaks {}   Shots {}",
                self.feed.kills, self.feed.leaks, self.feed.shots
            ));
            for line in self.feed.lines() {
                ui.label(line);
            }
        });
        if let Some(tower) = upgrade {
            self.request(ClientRequest::UpgradeTower(tower));
        }
        if let Some((tower, priority)) = retarget {
            self.request(ClientRequest::SetPriority { tower, priority });
        }
    }

    // -----------------------------------------------------------------------
    // Battlefield
    // -----------------------------------------------------------------------

    fn show_field(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE.fill(ui::BACKGROUND))
            .show(ctx, |ui| {
                let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::click());
                let (min, max) = ui::route_bounds(self.catalog.path.waypoints(), VIEW_MARGIN);
                let view = Viewport::fit(response.rect, min, max);

                self.draw_field(&painter, &view);

                if response.clicked()
                    && let Some(pos) = response.interact_pointer_pos()
                {
                    self.click(view.to_world(pos));
                }
            });
    }

    /// Select the tower under `world`, or build the selected kind there.
    fn click(&mut self, world: glam::Vec3) {
        match ui::pick_tower(&self.snapshot.towers, world, PICK_RADIUS) {
            Some(id) => self.selected_tower = Some(id),
            None => {
                self.selected_tower = None;
                self.request(ClientRequest::PlaceTower {
                    kind: self.selected_kind,
                    position: world,
                });
            }
        }
    }

    fn draw_field(&self, painter: &Painter, view: &Viewport) {
        let path: Vec<Pos2> = self
            .catalog
            .path
            .waypoints()
            .iter()
            .map(|point| view.to_screen(*point))
            .collect();
        painter.add(egui::Shape::line(
            path,
            Stroke::new(view.length(2.0), ui::PATH_COLOR),
        ));

        if let Some(tower) = self.selected() {
            painter.circle_stroke(
                view.to_screen(tower.position),
                view.length(tower.range),
                Stroke::new(1.5, ui::RANGE_COLOR),
            );
        }

        for tower in &self.snapshot.towers {
            let glyph = ui::tower_glyph(tower.kind);
            draw_glyph(painter, view, tower.position, glyph);
        }

        for enemy in &self.snapshot.enemies {
            let glyph = ui::enemy_glyph(enemy.kind);
            draw_glyph(painter, view, enemy.position, glyph);

            let fraction = if enemy.max_health > 0.0 {
                enemy.health / enemy.max_health
            } else {
                0.0
            };
            let center = view.to_screen(enemy.position);
            let width = view.length(glyph.radius * 2.0);
            let top = center.y - view.length(glyph.radius) - 5.0;
            let bar = Rect::from_min_size(pos2(center.x - width / 2.0, top), vec2(width, 3.0));
            painter.rect_filled(bar, 0.0, Color32::from_gray(40));
            painter.rect_filled(
                Rect::from_min_size(bar.min, vec2(width * fraction.clamp(0.0, 1.0), 3.0)),
                0.0,
                ui::health_color(fraction),
            );
        }

        for projectile in &self.snapshot.projectiles {
            painter.circle_filled(
                view.to_screen(projectile.position),
                view.length(0.4).max(2.0),
                ui::PROJECTILE_COLOR,
            );
        }
    }
}

fn draw_glyph(painter: &Painter, view: &Viewport, position: glam::Vec3, glyph: ui::Glyph) {
    let center = view.to_screen(position);
    let radius = view.length(glyph.radius);
    painter.circle_filled(center, radius, glyph.color);
    painter.text(
        center,
        Align2::CENTER_CENTER,
        glyph.character,
        FontId::proportional(radius.max(8.0)),
        Color32::BLACK,
    );
}
