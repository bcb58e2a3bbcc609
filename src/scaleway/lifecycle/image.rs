//! Image resolution and catalogue listing for the Scaleway gateway.

use scaleway_rs::ScalewayImage;

use crate::gateway::{Image, NodeTemplate};
use crate::scaleway::api::ImageQuery;
use crate::scaleway::types::Zone;
use crate::scaleway::{ScalewayGateway, ScalewayGatewayError};
use crate::ssh::CommandRunner;

/// Newest available image for `arch`, if any.
pub(crate) fn newest_available(images: Vec<ScalewayImage>, arch: &str) -> Option<ScalewayImage> {
    images
        .into_iter()
        .filter(|image| image.arch == arch && image.state == "available")
        .max_by(|lhs, rhs| lhs.creation_date.cmp(&rhs.creation_date))
}

pub(crate) fn image_from_catalogue(image: ScalewayImage) -> Image {
    Image {
        id: image.id,
        name: image.name,
        architecture: image.arch,
        state: image.state,
    }
}

impl<R: CommandRunner> ScalewayGateway<R> {
    /// Resolves the template's image. The operating system family, when set,
    /// replaces the image label as the name filter. Images owned by the
    /// project win over public ones.
    pub(in crate::scaleway) async fn resolve_image_id(
        &self,
        zone: &Zone,
        template: &NodeTemplate,
    ) -> Result<String, ScalewayGatewayError> {
        let label = template
            .os_family
            .as_deref()
            .unwrap_or(&template.image_label);
        let arch = &self.config.default_architecture;

        let scoped = ImageQuery {
            public: false,
            project: Some(self.project_id.clone()),
            organization: self.config.default_organization_id.clone(),
            name: Some(label.to_owned()),
            arch: arch.clone(),
        };
        let project_images = self.api.list_images(zone, &scoped).await?;

        let candidates = if project_images.is_empty() {
            let public = ImageQuery {
                public: true,
                name: Some(label.to_owned()),
                arch: arch.clone(),
                ..ImageQuery::default()
            };
            self.api.list_images(zone, &public).await?
        } else {
            project_images
        };

        newest_available(candidates, arch)
            .map(|image| image.id)
            .ok_or_else(|| ScalewayGatewayError::ImageNotFound {
                label: label.to_owned(),
                arch: arch.clone(),
                zone: zone.to_string(),
            })
    }

    /// Public images for the configured architecture, sorted by name.
    pub(in crate::scaleway) async fn image_catalogue(
        &self,
        zone: &Zone,
    ) -> Result<Vec<Image>, ScalewayGatewayError> {
        let query = ImageQuery {
            public: true,
            arch: self.config.default_architecture.clone(),
            ..ImageQuery::default()
        };
        let mut images: Vec<Image> = self
            .api
            .list_images(zone, &query)
            .await?
            .into_iter()
            .map(image_from_catalogue)
            .collect();
        images.sort_by(|lhs, rhs| lhs.name.cmp(&rhs.name).then(lhs.id.cmp(&rhs.id)));
        Ok(images)
    }
}
