use bstock_client::types::Language;

/// User-facing strings for one language.
#[derive(Debug, Clone, Copy)]
pub struct Messages {
    pub available: &'static str,
    pub unavailable: &'static str,
    pub checking: &'static str,
    pub enter_url: &'static str,
    pub invalid_url: &'static str,
    pub already_tracked: &'static str,
    pub not_tracked: &'static str,
    pub no_items: &'static str,
    pub interval_too_short: &'static str,
    pub notification_title: &'static str,
    notification_body: &'static str,
}

static EN: Messages = Messages {
    available: "Stock B is available",
    unavailable: "Stock B is not available",
    checking: "Checking...",
    enter_url: "Please enter a URL or article ID",
    invalid_url: "Invalid URL or article ID",
    already_tracked: "This item is already tracked",
    not_tracked: "This item is not tracked",
    no_items: "No items to check",
    interval_too_short: "The check interval must be at least 1 minute",
    notification_title: "B-Stock Available!",
    notification_body: "B-Stock is available for {name}",
};

static FR: Messages = Messages {
    available: "Stock B disponible",
    unavailable: "Stock B non disponible",
    checking: "Vérification...",
    enter_url: "Veuillez entrer une URL ou un ID d'article",
    invalid_url: "URL ou ID d'article invalide",
    already_tracked: "Cet article est déjà suivi",
    not_tracked: "Cet article n'est pas suivi",
    no_items: "Aucun article à vérifier",
    interval_too_short: "L'intervalle de vérification doit être d'au moins 1 minute",
    notification_title: "Stock B disponible !",
    notification_body: "Le stock B est disponible pour {name}",
};

static DE: Messages = Messages {
    available: "B-Ware verfügbar",
    unavailable: "B-Ware nicht verfügbar",
    checking: "Wird geprüft...",
    enter_url: "Bitte geben Sie eine URL oder Artikel-ID ein",
    invalid_url: "Ungültige URL oder Artikel-ID",
    already_tracked: "Dieser Artikel wird bereits verfolgt",
    not_tracked: "Dieser Artikel wird nicht verfolgt",
    no_items: "Keine Artikel zum Prüfen",
    interval_too_short: "Das Prüfintervall muss mindestens 1 Minute betragen",
    notification_title: "B-Ware verfügbar!",
    notification_body: "B-Ware ist verfügbar für {name}",
};

impl Messages {
    pub fn for_language(language: Language) -> &'static Messages {
        match language {
            Language::En => &EN,
            Language::Fr => &FR,
            Language::De => &DE,
        }
    }

    pub fn status_message(&self, available: bool) -> &'static str {
        if available {
            self.available
        } else {
            self.unavailable
        }
    }

    pub fn notification_body(&self, name: &str) -> String {
        self.notification_body.replace("{name}", name)
    }
}
